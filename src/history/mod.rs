//! Command history engine: the single owner of the in-memory document.
//!
//! Every document mutation flows through a named operation here. Each
//! operation either fully applies (document updated, command pushed) or is
//! fully rejected as a `false`-returning no-op, so callers never observe a
//! partially applied state. Undo and redo move whole commands between two
//! bounded stacks; any other mutation discards the redo branch.

pub mod command;
pub mod document;

use command::{Command, CommandKind};
use document::{Document, Slide, SlideId, SlideUpdate, Template};

/// Maximum retained undo steps; the oldest command is evicted beyond this.
pub const MAX_UNDO: usize = 100;

#[derive(Debug)]
pub struct CommandHistory {
    document: Document,
    selected: SlideId,
    undo_stack: Vec<Command>,
    redo_stack: Vec<Command>,
}

impl CommandHistory {
    /// Takes ownership of the document under edit. An empty slide list is
    /// normalized to a single blank slide so the non-empty invariant holds
    /// from the start.
    pub fn new(mut document: Document) -> Self {
        if document.slides.is_empty() {
            document.slides.push(Slide::blank());
        }
        let selected = document.slides[0].id;
        Self {
            document,
            selected,
            undo_stack: Vec::new(),
            redo_stack: Vec::new(),
        }
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn selected_slide_id(&self) -> SlideId {
        self.selected
    }

    pub fn select(&mut self, id: SlideId) -> bool {
        if self.document.index_of(id).is_some() {
            self.selected = id;
            true
        } else {
            false
        }
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    /// Inserts a blank slide after `after`, or at the end of the deck when
    /// no anchor is given (the toolbar calls it bare). The new slide becomes
    /// the selection.
    pub fn add_slide(&mut self, after: Option<SlideId>) -> bool {
        let index = match after {
            Some(id) => match self.document.index_of(id) {
                Some(i) => i + 1,
                None => return false,
            },
            None => self.document.slides.len(),
        };

        let slide = Slide::blank();
        let selected_before = self.selected;
        self.document.slides.insert(index, slide.clone());
        self.selected = slide.id;
        self.push(Command {
            kind: CommandKind::AddSlide { index, slide },
            selected_before,
            selected_after: self.selected,
        });
        true
    }

    /// Removes a slide. Rejected on the last remaining slide or an unknown
    /// id. When the selected slide is removed, selection moves to the slide
    /// that followed it, or the preceding one if it was last.
    pub fn delete_slide(&mut self, id: SlideId) -> bool {
        if self.document.slides.len() <= 1 {
            return false;
        }
        let index = match self.document.index_of(id) {
            Some(i) => i,
            None => return false,
        };

        let selected_before = self.selected;
        let slide = self.document.slides.remove(index);
        if self.selected == id {
            self.selected = match self.document.slides.get(index) {
                Some(next) => next.id,
                None => self.document.slides[index - 1].id,
            };
        }
        self.push(Command {
            kind: CommandKind::DeleteSlide { index, slide },
            selected_before,
            selected_after: self.selected,
        });
        true
    }

    /// Inserts a deep copy (fresh id, identical content) right after the
    /// source slide and selects it.
    pub fn duplicate_slide(&mut self, id: SlideId) -> bool {
        let index = match self.document.index_of(id) {
            Some(i) => i,
            None => return false,
        };

        let copy = self.document.slides[index].duplicate();
        let selected_before = self.selected;
        let insert_at = index + 1;
        self.document.slides.insert(insert_at, copy.clone());
        self.selected = copy.id;
        self.push(Command {
            kind: CommandKind::DuplicateSlide {
                index: insert_at,
                slide: copy,
            },
            selected_before,
            selected_after: self.selected,
        });
        true
    }

    /// Shallow-merges the provided fields into a slide. A command is pushed
    /// even when the new values equal the old ones; the engine does not
    /// diff for semantic equality, so redo history is discarded either way.
    pub fn update_slide(&mut self, id: SlideId, update: &SlideUpdate) -> bool {
        let index = match self.document.index_of(id) {
            Some(i) => i,
            None => return false,
        };

        let before = self.document.slides[index].clone();
        update.merge_into(&mut self.document.slides[index]);
        let after = self.document.slides[index].clone();
        self.push(Command {
            kind: CommandKind::UpdateSlide { before, after },
            selected_before: self.selected,
            selected_after: self.selected,
        });
        true
    }

    /// Overwrites the styling fields of one slide from a template.
    pub fn apply_template(&mut self, id: SlideId, template: &Template) -> bool {
        let index = match self.document.index_of(id) {
            Some(i) => i,
            None => return false,
        };

        let before = self.document.slides[index].clone();
        template.apply_to(&mut self.document.slides[index]);
        let after = self.document.slides[index].clone();
        self.push(Command {
            kind: CommandKind::ApplyTemplate { before, after },
            selected_before: self.selected,
            selected_after: self.selected,
        });
        true
    }

    /// Restyles every slide as a single undoable command.
    pub fn apply_template_all(&mut self, template: &Template) -> bool {
        let before = self.document.slides.clone();
        for slide in &mut self.document.slides {
            template.apply_to(slide);
        }
        let after = self.document.slides.clone();
        self.push(Command {
            kind: CommandKind::ApplyTemplateAll { before, after },
            selected_before: self.selected,
            selected_after: self.selected,
        });
        true
    }

    /// Wholesale slide-list replacement (bulk/generated content). Rejected
    /// when the new list is empty. Selection moves to the first new slide.
    pub fn replace_all_slides(&mut self, slides: Vec<Slide>) -> bool {
        if slides.is_empty() {
            return false;
        }

        let before = std::mem::replace(&mut self.document.slides, slides);
        let after = self.document.slides.clone();
        let selected_before = self.selected;
        self.selected = self.document.slides[0].id;
        self.push(Command {
            kind: CommandKind::ReplaceAllSlides { before, after },
            selected_before,
            selected_after: self.selected,
        });
        true
    }

    /// Reverts the most recent command. No-op on an empty undo stack.
    pub fn undo(&mut self) -> bool {
        let command = match self.undo_stack.pop() {
            Some(c) => c,
            None => return false,
        };
        command.revert(&mut self.document);
        self.selected = command.selected_before;
        self.redo_stack.push(command);
        true
    }

    /// Replays the most recently undone command. No-op on an empty redo stack.
    pub fn redo(&mut self) -> bool {
        let command = match self.redo_stack.pop() {
            Some(c) => c,
            None => return false,
        };
        command.apply(&mut self.document);
        self.selected = command.selected_after;
        self.undo_stack.push(command);
        true
    }

    fn push(&mut self, command: Command) {
        self.redo_stack.clear();
        self.undo_stack.push(command);
        if self.undo_stack.len() > MAX_UNDO {
            self.undo_stack.remove(0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::document::SlideLayout;
    use super::*;

    fn history_with(n: usize) -> CommandHistory {
        let mut document = Document::new("doc-1", "Test deck");
        for i in 1..n {
            let mut slide = Slide::blank();
            slide.title = format!("Slide {i}");
            document.slides.push(slide);
        }
        CommandHistory::new(document)
    }

    fn slide_ids(history: &CommandHistory) -> Vec<SlideId> {
        history.document().slides.iter().map(|s| s.id).collect()
    }

    #[test]
    fn add_undo_redo_round_trip() {
        let mut history = history_with(1);
        let a = history.selected_slide_id();
        let before = history.document().clone();

        assert!(history.add_slide(None));
        assert_eq!(history.document().slides.len(), 2);
        let b = history.selected_slide_id();
        assert_ne!(a, b);
        let after = history.document().clone();

        assert!(history.undo());
        assert_eq!(history.document(), &before);
        assert_eq!(history.selected_slide_id(), a);
        assert!(history.can_redo());

        assert!(history.redo());
        assert_eq!(history.document(), &after);
        assert_eq!(history.selected_slide_id(), b);
        assert!(!history.can_redo());
    }

    #[test]
    fn add_slide_after_anchor() {
        let mut history = history_with(3);
        let anchor = slide_ids(&history)[0];

        assert!(history.add_slide(Some(anchor)));
        let ids = slide_ids(&history);
        assert_eq!(ids.len(), 4);
        assert_eq!(ids[1], history.selected_slide_id());
    }

    #[test]
    fn delete_selected_moves_selection_to_following_slide() {
        let mut history = history_with(3);
        let ids = slide_ids(&history);
        let (a, b, c) = (ids[0], ids[1], ids[2]);
        history.select(b);

        assert!(history.delete_slide(b));
        assert_eq!(slide_ids(&history), vec![a, c]);
        assert_eq!(history.selected_slide_id(), c);

        assert!(history.undo());
        assert_eq!(slide_ids(&history), vec![a, b, c]);
        assert_eq!(history.selected_slide_id(), b);
    }

    #[test]
    fn delete_last_in_order_falls_back_to_preceding_slide() {
        let mut history = history_with(2);
        let ids = slide_ids(&history);
        history.select(ids[1]);

        assert!(history.delete_slide(ids[1]));
        assert_eq!(history.selected_slide_id(), ids[0]);
    }

    #[test]
    fn delete_sole_slide_is_rejected() {
        let mut history = history_with(1);
        let id = history.selected_slide_id();
        let before = history.document().clone();

        assert!(!history.delete_slide(id));
        assert_eq!(history.document(), &before);
        assert!(!history.can_undo());
    }

    #[test]
    fn document_never_empties() {
        let mut history = history_with(3);
        for id in slide_ids(&history) {
            history.delete_slide(id);
        }
        assert_eq!(history.document().slides.len(), 1);
    }

    #[test]
    fn duplicate_inserts_copy_after_source() {
        let mut history = history_with(2);
        let ids = slide_ids(&history);
        let source = ids[0];
        history.update_slide(source, &SlideUpdate::title("Original"));

        assert!(history.duplicate_slide(source));
        let slides = &history.document().slides;
        assert_eq!(slides.len(), 3);
        assert_eq!(slides[1].title, "Original");
        assert_ne!(slides[1].id, source);
        assert_eq!(history.selected_slide_id(), slides[1].id);

        assert!(history.undo());
        assert_eq!(slide_ids(&history), ids);
    }

    #[test]
    fn update_merges_only_provided_fields() {
        let mut history = history_with(1);
        let id = history.selected_slide_id();
        history.update_slide(
            id,
            &SlideUpdate {
                content: Some("body text".into()),
                ..SlideUpdate::default()
            },
        );
        let before_layout = history.document().slides[0].layout;

        assert!(history.update_slide(id, &SlideUpdate::title("Hello")));
        let slide = &history.document().slides[0];
        assert_eq!(slide.title, "Hello");
        assert_eq!(slide.content.as_deref(), Some("body text"));
        assert_eq!(slide.layout, before_layout);

        assert!(history.undo());
        assert_eq!(history.document().slides[0].title, "");
        assert_eq!(
            history.document().slides[0].content.as_deref(),
            Some("body text")
        );
    }

    #[test]
    fn redo_cleared_by_any_new_mutation() {
        let mut history = history_with(2);
        let id = history.selected_slide_id();

        assert!(history.update_slide(id, &SlideUpdate::title("One")));
        assert!(history.undo());
        assert!(history.can_redo());

        // An update writing identical values is still a mutation.
        let current_title = history.document().slides[0].title.clone();
        assert!(history.update_slide(id, &SlideUpdate::title(current_title)));
        assert!(!history.can_redo());
    }

    #[test]
    fn undo_redo_on_empty_stacks_are_noops() {
        let mut history = history_with(1);
        assert!(!history.undo());
        assert!(!history.redo());
        assert!(!history.can_undo());
        assert!(!history.can_redo());
    }

    #[test]
    fn template_all_is_one_command() {
        let mut history = history_with(4);
        let template = Template {
            background: "#1a1a2e".into(),
            text_color: "#eaeaea".into(),
            accent_color: "#e94560".into(),
        };
        let before = history.document().clone();

        assert!(history.apply_template_all(&template));
        for slide in &history.document().slides {
            assert_eq!(slide.style.background.as_deref(), Some("#1a1a2e"));
        }

        // A single undo restores every slide.
        assert!(history.undo());
        assert_eq!(history.document(), &before);
        assert!(!history.can_undo());
    }

    #[test]
    fn template_preserves_non_styling_fields() {
        let mut history = history_with(1);
        let id = history.selected_slide_id();
        history.update_slide(id, &SlideUpdate::title("Keep me"));
        let template = Template {
            background: "#fff".into(),
            text_color: "#000".into(),
            accent_color: "#f90".into(),
        };

        assert!(history.apply_template(id, &template));
        let slide = &history.document().slides[0];
        assert_eq!(slide.title, "Keep me");
        assert_eq!(slide.layout, SlideLayout::Title);
    }

    #[test]
    fn replace_all_swaps_list_and_inverts() {
        let mut history = history_with(2);
        let before = history.document().clone();
        let generated = vec![Slide::blank(), Slide::blank(), Slide::blank()];
        let generated_ids: Vec<SlideId> = generated.iter().map(|s| s.id).collect();

        assert!(history.replace_all_slides(generated));
        assert_eq!(slide_ids(&history), generated_ids);
        assert_eq!(history.selected_slide_id(), generated_ids[0]);

        assert!(history.undo());
        assert_eq!(history.document(), &before);
    }

    #[test]
    fn replace_all_with_empty_list_is_rejected() {
        let mut history = history_with(2);
        assert!(!history.replace_all_slides(Vec::new()));
        assert_eq!(history.document().slides.len(), 2);
        assert!(!history.can_undo());
    }

    #[test]
    fn selection_always_references_existing_slide() {
        let mut history = history_with(5);
        let ids = slide_ids(&history);
        history.select(ids[4]);
        history.delete_slide(ids[4]);
        history.delete_slide(ids[3]);
        history.undo();
        history.redo();
        history.replace_all_slides(vec![Slide::blank()]);
        history.undo();

        let selected = history.selected_slide_id();
        assert!(history.document().slide(selected).is_some());
    }

    #[test]
    fn undo_history_is_bounded() {
        let mut history = history_with(1);
        let id = history.selected_slide_id();
        for i in 0..(MAX_UNDO + 20) {
            history.update_slide(id, &SlideUpdate::title(format!("rev {i}")));
        }

        assert_eq!(history.undo_stack.len(), MAX_UNDO);
        while history.undo() {}
        // The oldest 20 revisions were evicted, so undo stops at rev 19.
        assert_eq!(history.document().slides[0].title, "rev 19");
    }
}
