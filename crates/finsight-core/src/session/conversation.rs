use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::session::types::{SourceName, TurnId};

/// One unit of conversation content: the running summary, a human question,
/// or an assistant answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub id: TurnId,
    pub is_human: bool,
    /// Accumulated text; append-only while streaming.
    pub content: String,
    /// Citations for this turn, in backend ranking order.
    pub sources: Vec<SourceName>,
    /// Evaluation metric scores, set atomically once available.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eval_scores: Option<BTreeMap<String, f64>>,
    /// True only while content is still being appended.
    pub loading: bool,
}

impl Turn {
    fn summary() -> Self {
        Self {
            id: TurnId::SUMMARY,
            is_human: false,
            content: String::new(),
            sources: Vec::new(),
            eval_scores: None,
            loading: false,
        }
    }

    fn human(id: TurnId, content: String) -> Self {
        Self {
            id,
            is_human: true,
            content,
            sources: Vec::new(),
            eval_scores: None,
            loading: false,
        }
    }

    fn assistant(id: TurnId) -> Self {
        Self {
            id,
            is_human: false,
            content: String::new(),
            sources: Vec::new(),
            eval_scores: None,
            loading: true,
        }
    }
}

/// Ordered, append-only turn storage with streaming-safe mutation. Index 0
/// is always the summary slot; follow-up turns alternate human/assistant
/// from index 1.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    turns: Vec<Turn>,
    next_id: u64,
}

impl Default for Conversation {
    fn default() -> Self {
        Self::new()
    }
}

impl Conversation {
    pub fn new() -> Self {
        Self {
            turns: vec![Turn::summary()],
            next_id: 1,
        }
    }

    /// Drops every turn and installs a fresh summary slot ready to receive a
    /// new topic's stream. Only a `search` does this.
    pub fn reset(&mut self) -> TurnId {
        self.turns = vec![Turn {
            loading: true,
            ..Turn::summary()
        }];
        self.next_id = 1;
        TurnId::SUMMARY
    }

    /// Appends a human turn carrying the given question.
    pub fn push_human(&mut self, content: String) -> TurnId {
        let id = self.allocate_id();
        self.turns.push(Turn::human(id, content));
        id
    }

    /// Appends an empty assistant turn in the loading state.
    pub fn push_assistant(&mut self) -> TurnId {
        let id = self.allocate_id();
        self.turns.push(Turn::assistant(id));
        id
    }

    /// Concatenates `text` onto the named turn. Chunks apply in arrival
    /// order; the final content byte sequence is exactly the concatenation.
    /// Silently a no-op when the turn no longer exists.
    pub fn append_chunk(&mut self, id: TurnId, text: &str) -> bool {
        match self.get_mut(id) {
            Some(turn) => {
                turn.content.push_str(text);
                true
            }
            None => false,
        }
    }

    /// Records the cited source names on a turn, keeping arrival order and
    /// skipping names already present.
    pub fn cite(&mut self, id: TurnId, names: impl IntoIterator<Item = SourceName>) -> bool {
        match self.get_mut(id) {
            Some(turn) => {
                for name in names {
                    if !turn.sources.contains(&name) {
                        turn.sources.push(name);
                    }
                }
                true
            }
            None => false,
        }
    }

    /// Set-once with overwrite: a second call replaces the whole map.
    pub fn set_eval_scores(&mut self, id: TurnId, scores: BTreeMap<String, f64>) -> bool {
        match self.get_mut(id) {
            Some(turn) => {
                turn.eval_scores = Some(scores);
                true
            }
            None => false,
        }
    }

    /// Clears the loading flag, leaving whatever content has accumulated.
    pub fn finalize(&mut self, id: TurnId) -> bool {
        match self.get_mut(id) {
            Some(turn) => {
                turn.loading = false;
                true
            }
            None => false,
        }
    }

    pub fn get(&self, id: TurnId) -> Option<&Turn> {
        self.turns.iter().find(|t| t.id == id)
    }

    fn get_mut(&mut self, id: TurnId) -> Option<&mut Turn> {
        self.turns.iter_mut().find(|t| t.id == id)
    }

    pub fn summary(&self) -> &Turn {
        // The summary slot is installed at construction and on reset; it is
        // never removed.
        &self.turns[0]
    }

    pub fn loading_turn(&self) -> Option<&Turn> {
        self.turns.iter().find(|t| t.loading)
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    fn allocate_id(&mut self) -> TurnId {
        let id = TurnId(self.next_id);
        self.next_id += 1;
        id
    }
}
