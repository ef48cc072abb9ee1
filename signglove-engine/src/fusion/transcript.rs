//! Running text built from committed symbol actions

use signglove_common::events::SymbolAction;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Transcript {
    text: String,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply(&mut self, action: &SymbolAction) {
        match action {
            SymbolAction::Append { text } => self.text.push_str(text),
            SymbolAction::Space => self.text.push(' '),
            SymbolAction::Delete => {
                self.text.pop();
            }
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn clear(&mut self) {
        self.text.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_actions() {
        let mut transcript = Transcript::new();
        transcript.apply(&SymbolAction::Append { text: "H".to_string() });
        transcript.apply(&SymbolAction::Append { text: "I".to_string() });
        transcript.apply(&SymbolAction::Space);
        transcript.apply(&SymbolAction::Append { text: "X".to_string() });
        transcript.apply(&SymbolAction::Delete);
        assert_eq!(transcript.text(), "HI ");
    }

    #[test]
    fn test_delete_on_empty_is_noop() {
        let mut transcript = Transcript::new();
        transcript.apply(&SymbolAction::Delete);
        assert_eq!(transcript.text(), "");
    }
}
