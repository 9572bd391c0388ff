//! System instruction templates for the role-play agent.

use crate::topic::Topic;
use anyhow::{Context, Result};
use std::path::Path;

const BASE_PROMPT: &str = "\
Ты чат-бот, помогающий человеку учить русский язык через ролевые диалоги.
Всегда говори по-русски, избегай английского.
Говори как с маленьким ребёнком, который только начинает учить язык.
Используй только самые простые и частые слова — из повседневной жизни.
Избегай редких слов, сложных фраз и длинных предложений.
Отвечай коротко, ясно и по смыслу — не более 6–10 слов.
Каждое твоё сообщение должно заканчиваться простым вопросом, чтобы продолжить диалог.
Будь **вежливым**, **живым** и **терпеливым** — как хороший учитель, который играет роль.

В конце каждого твоего ответа предлагай **две очень простые и короткие фразы**, которые человек может выбрать как следующий ответ.

Формат:
Твоя реплика.

Варианты ответа:
– Вариант 1
– Вариант 2

Не используй одинаковые фразы каждый раз. Пусть ответы будут связаны с твоей репликой и логичны для продолжения.";

const CORRECTION_PROMPT: &str = "\
Если пользователь делает ошибку — сначала повтори его фразу в правильной и естественной форме.
Начни это предложение словами: \"Правильнее сказать...\".
Если ошибки нет — не повторяй его фразу.";

const GREETING_PROMPT: &str = "\
Начни диалог с подходящего приветствия, соответствующего твоей роли. Не используй всегда одно и то же приветствие.";

/// The three instruction fragments combined into a conversation's system instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptSet {
    pub base: String,
    pub correction: String,
    pub greeting: String,
}

impl Default for PromptSet {
    fn default() -> Self {
        Self {
            base: BASE_PROMPT.to_string(),
            correction: CORRECTION_PROMPT.to_string(),
            greeting: GREETING_PROMPT.to_string(),
        }
    }
}

impl PromptSet {
    /// Loads `base.md`, `correction.md` and `greeting.md` from a directory.
    ///
    /// Missing files keep their built-in text.
    pub fn load_dir(dir: &Path) -> Result<Self> {
        let mut prompts = Self::default();
        for entry in std::fs::read_dir(dir)
            .with_context(|| format!("Failed to read prompts directory {}", dir.display()))?
        {
            let path = entry?.path();
            if !path.is_file() || path.extension().and_then(|s| s.to_str()) != Some("md") {
                continue;
            }
            let key = path
                .file_stem()
                .and_then(|s| s.to_str())
                .context("Could not get file stem")?;
            let slot = match key {
                "base" => &mut prompts.base,
                "correction" => &mut prompts.correction,
                "greeting" => &mut prompts.greeting,
                _ => {
                    tracing::warn!(file = %path.display(), "Ignoring unknown prompt file");
                    continue;
                }
            };
            *slot = std::fs::read_to_string(&path)?.trim().to_string();
        }
        Ok(prompts)
    }

    /// Builds the system instruction for one conversation.
    pub fn instruction(&self, topic: &Topic, correction: bool) -> String {
        let mut parts = vec![self.base.as_str()];
        if correction {
            parts.push(self.correction.as_str());
        }
        parts.push(topic.system_prompt.as_str());
        parts.push(self.greeting.as_str());
        parts.join("\n\n")
    }
}
