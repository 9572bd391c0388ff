//! Role-play topics the learner can choose from.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// An immutable role-play scenario.
///
/// `system_prompt` describes the persona the agent plays; it is appended to
/// the shared teaching instruction when a conversation is opened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Topic {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub emoji: String,
    #[serde(default)]
    pub description: String,
    pub system_prompt: String,
}

impl Topic {
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        system_prompt: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            emoji: String::new(),
            description: String::new(),
            system_prompt: system_prompt.into(),
        }
    }

    fn with_display(mut self, emoji: &str, description: &str) -> Self {
        self.emoji = emoji.to_string();
        self.description = description.to_string();
        self
    }
}

/// Ordered, read-only list of topics loaded once at startup.
#[derive(Debug, Clone)]
pub struct TopicCatalog {
    topics: Vec<Topic>,
}

impl TopicCatalog {
    /// Builds a catalog, rejecting empty lists and duplicate ids.
    pub fn new(topics: Vec<Topic>) -> Result<Self> {
        anyhow::ensure!(!topics.is_empty(), "Topic catalog is empty");
        for (i, topic) in topics.iter().enumerate() {
            anyhow::ensure!(!topic.id.trim().is_empty(), "Topic #{} has an empty id", i);
            if topics[..i].iter().any(|t| t.id == topic.id) {
                anyhow::bail!("Duplicate topic id '{}'", topic.id);
            }
        }
        Ok(Self { topics })
    }

    /// Loads a JSON array of topics from disk.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read topic catalog {}", path.display()))?;
        let topics: Vec<Topic> = serde_json::from_str(&raw)
            .with_context(|| format!("Invalid topic catalog {}", path.display()))?;
        Self::new(topics)
    }

    pub fn topics(&self) -> &[Topic] {
        &self.topics
    }

    pub fn get(&self, id: &str) -> Option<&Topic> {
        self.topics.iter().find(|t| t.id == id)
    }

    /// The eight everyday scenarios shipped with the application.
    pub fn builtin() -> Self {
        let topics = vec![
            Topic::new(
                "market",
                "בשוק",
                "Ты играешь роль продавца на рынке. Говори по-русски, дружелюбно, просто и с юмором. Отвечай по делу, как настоящий продавец.",
            )
            .with_display("🛍️", "שיחה עם מוכר בשוק"),
            Topic::new(
                "friend",
                "עם חבר",
                "Ты играешь роль хорошего друга. Говори неформально, тепло и по-русски. Спрашивай, как у меня дела, и делись своими.",
            )
            .with_display("👋", "שיחה ידידותית עם חבר"),
            Topic::new(
                "restaurant",
                "במסעדה",
                "Ты официант в русском кафе. Обслуживай вежливо, просто, по-русски. Спрашивай, что я хочу заказать, и предлагай блюда.",
            )
            .with_display("🍽️", "הזמנת אוכל ממלצר במסעדה"),
            Topic::new(
                "cinema",
                "בקולנוע",
                "Ты кассир в кинотеатре. Говори по-русски, профессионально и просто. Помоги выбрать сеанс и купить билет.",
            )
            .with_display("🎬", "רכישת כרטיסים לקולנוע"),
            Topic::new(
                "street",
                "ברחוב",
                "Ты житель города и помогаешь туристу сориентироваться на улице и найти нужное место. Отвечай дружелюбно, понятно и по делу.",
            )
            .with_display("🚇", "התמצאות ברחוב"),
            Topic::new(
                "hotel",
                "בבית מלון",
                "Ты администратор отеля. Говори по-русски вежливо, помогай с заселением, отвечай на вопросы.",
            )
            .with_display("🏨", "צ'ק אין במלון"),
            Topic::new(
                "doctor",
                "במרפאה",
                "Ты врач в клинике. Спрашивай о симптомах, отвечай спокойно, по-русски и профессионально.",
            )
            .with_display("👨‍⚕️", "ביקור אצל הרופא"),
            Topic::new(
                "clothing",
                "בחנות בגדים",
                "Ты продавец в магазине одежды. Говори по-русски, помогай выбрать размер и фасон.",
            )
            .with_display("👕", "קניית בגדים"),
        ];
        Self { topics }
    }
}
