use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

use super::super::episode::push_target_word;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(super) enum FormField {
    #[default]
    Topic,
    Words,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum FormOutcome {
    Editing,
    Submit,
    Close,
}

/// Topic plus target-word tag input. Input survives closing the form and
/// failed submissions; it is cleared only after a successful generation.
#[derive(Debug, Clone, Default)]
pub(super) struct GeneratorForm {
    pub(super) topic: String,
    pub(super) words: Vec<String>,
    pub(super) word_input: String,
    pub(super) focus: FormField,
}

impl GeneratorForm {
    pub(super) fn can_submit(&self) -> bool {
        !self.topic.trim().is_empty() && !self.words.is_empty()
    }

    pub(super) fn clear(&mut self) {
        *self = Self::default();
    }

    pub(super) fn handle_key(&mut self, key: KeyEvent) -> FormOutcome {
        if key.modifiers.contains(KeyModifiers::CONTROL) {
            return match key.code {
                KeyCode::Char('s') => {
                    self.commit_word_input();
                    if self.can_submit() {
                        FormOutcome::Submit
                    } else {
                        FormOutcome::Editing
                    }
                }
                _ => FormOutcome::Editing,
            };
        }

        match key.code {
            KeyCode::Esc => return FormOutcome::Close,
            KeyCode::Tab | KeyCode::BackTab => {
                self.focus = match self.focus {
                    FormField::Topic => FormField::Words,
                    FormField::Words => FormField::Topic,
                };
            }
            KeyCode::Enter => match self.focus {
                FormField::Topic => self.focus = FormField::Words,
                FormField::Words => self.commit_word_input(),
            },
            KeyCode::Char(',') if self.focus == FormField::Words => self.commit_word_input(),
            KeyCode::Char(ch) => match self.focus {
                FormField::Topic => self.topic.push(ch),
                FormField::Words => self.word_input.push(ch),
            },
            KeyCode::Backspace => match self.focus {
                FormField::Topic => {
                    self.topic.pop();
                }
                FormField::Words => {
                    if self.word_input.pop().is_none() {
                        self.words.pop();
                    }
                }
            },
            _ => {}
        }
        FormOutcome::Editing
    }

    fn commit_word_input(&mut self) {
        if push_target_word(&mut self.words, &self.word_input) || self.word_input.trim().is_empty()
        {
            self.word_input.clear();
        }
    }
}
