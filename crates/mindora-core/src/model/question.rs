use super::answer::AnswerValue;
use super::ids::QuestionId;
use serde::{Deserialize, Serialize};

pub const DEFAULT_QUALITY: f64 = 0.8;

/// A yes/no probe of a single feature key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    pub id: QuestionId,
    pub text: String,
    /// Alternate phrasings of the same probe.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub variants: Vec<String>,
    #[serde(alias = "featureKey")]
    pub feature_key: String,
    #[serde(default = "default_quality", alias = "quality_score")]
    pub quality: f64,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Tags to favour after a Yes.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub positive_next_tags: Vec<String>,
    /// Tags to favour after a No.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub negative_next_tags: Vec<String>,
    #[serde(default)]
    pub usage_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub abandon_rate: Option<f64>,
    #[serde(default)]
    pub archived: bool,
}

fn default_quality() -> f64 {
    DEFAULT_QUALITY
}

impl Question {
    pub fn new(
        id: impl Into<QuestionId>,
        text: impl Into<String>,
        feature_key: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            variants: Vec::new(),
            feature_key: feature_key.into(),
            quality: DEFAULT_QUALITY,
            tags: Vec::new(),
            positive_next_tags: Vec::new(),
            negative_next_tags: Vec::new(),
            usage_count: 0,
            abandon_rate: None,
            archived: false,
        }
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_quality(mut self, quality: f64) -> Self {
        self.quality = quality;
        self
    }

    pub fn with_usage(mut self, usage_count: u32) -> Self {
        self.usage_count = usage_count;
        self
    }

    pub fn with_follow_ups<I, S>(mut self, if_yes: I, if_no: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.positive_next_tags = if_yes.into_iter().map(Into::into).collect();
        self.negative_next_tags = if_no.into_iter().map(Into::into).collect();
        self
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }

    pub fn shares_tag_with(&self, tags: &[String]) -> bool {
        self.tags.iter().any(|t| tags.contains(t))
    }

    /// Follow-up tag hints for the given answer. Only hard answers carry hints.
    pub fn follow_up_tags(&self, value: AnswerValue) -> &[String] {
        match value {
            AnswerValue::Yes => &self.positive_next_tags,
            AnswerValue::No => &self.negative_next_tags,
            _ => &[],
        }
    }

    /// Quality with non-finite data replaced by the default.
    pub fn effective_quality(&self) -> f64 {
        if self.quality.is_finite() {
            self.quality
        } else {
            DEFAULT_QUALITY
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn follow_ups_depend_on_answer_polarity() {
        let question = Question::new("q_real", "Is your character real?", "is_real")
            .with_follow_ups(["profession"], ["fantasy"]);
        assert_eq!(question.follow_up_tags(AnswerValue::Yes), ["profession".to_string()]);
        assert_eq!(question.follow_up_tags(AnswerValue::No), ["fantasy".to_string()]);
        assert!(question.follow_up_tags(AnswerValue::Probably).is_empty());
    }

    #[test]
    fn deserializes_legacy_field_names() {
        let json = r#"{
            "id": "q_fly",
            "text": "Does your character have superpowers?",
            "featureKey": "can_fly",
            "tags": ["fantasy"],
            "quality_score": 0.7
        }"#;
        let question: Question = serde_json::from_str(json).unwrap();
        assert_eq!(question.feature_key, "can_fly");
        assert_eq!(question.quality, 0.7);
        assert_eq!(question.usage_count, 0);
        assert!(!question.archived);
    }
}
