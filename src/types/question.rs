//! Interactive questions raised by the remote agent mid-run

use serde::{Deserialize, Serialize};

use super::identifiers::{QuestionId, SessionId};

/// A selectable option of a sub-question
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionOption {
    /// Short label, also the answer value
    pub label: String,
    /// Optional longer explanation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// One prompt inside a question request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubQuestion {
    /// Prompt text
    pub question: String,
    /// Offered options, absent for free-form questions
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<QuestionOption>>,
}

/// An open question request as reported by `GET /question`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    /// Request id used to answer it
    pub id: QuestionId,
    /// Owning session; questions without one are never attributed
    #[serde(rename = "sessionID", default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<SessionId>,
    /// Ordered sub-questions
    #[serde(default)]
    pub questions: Vec<SubQuestion>,
}

impl Question {
    /// True if the question belongs to `session_id`
    #[must_use]
    pub fn belongs_to(&self, session_id: &SessionId) -> bool {
        self.session_id.as_ref() == Some(session_id)
    }
}

/// `GET /question` answers either with a bare array or a `{data: [...]}` wrapper
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum QuestionList {
    Bare(Vec<Question>),
    Wrapped { data: Vec<Question> },
}

impl QuestionList {
    pub(crate) fn into_vec(self) -> Vec<Question> {
        match self {
            Self::Bare(questions) | Self::Wrapped { data: questions } => questions,
        }
    }
}
