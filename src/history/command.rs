use super::document::{Document, Slide, SlideId};

/// One undoable unit of document mutation.
///
/// A command carries enough data to replay itself forward (redo) and to
/// restore the exact prior state (undo), including which slide was selected
/// on either side of the mutation. Commands are immutable once pushed; the
/// history stacks only ever move whole commands between each other.
#[derive(Debug, Clone)]
pub struct Command {
    pub(crate) kind: CommandKind,
    pub(crate) selected_before: SlideId,
    pub(crate) selected_after: SlideId,
}

#[derive(Debug, Clone)]
pub enum CommandKind {
    AddSlide {
        index: usize,
        slide: Slide,
    },
    DeleteSlide {
        index: usize,
        slide: Slide,
    },
    DuplicateSlide {
        index: usize,
        slide: Slide,
    },
    UpdateSlide {
        before: Slide,
        after: Slide,
    },
    ApplyTemplate {
        before: Slide,
        after: Slide,
    },
    /// One command even when it restyles every slide.
    ApplyTemplateAll {
        before: Vec<Slide>,
        after: Vec<Slide>,
    },
    ReplaceAllSlides {
        before: Vec<Slide>,
        after: Vec<Slide>,
    },
}

impl Command {
    /// Replays the forward direction of this command onto `document`.
    pub(crate) fn apply(&self, document: &mut Document) {
        match &self.kind {
            CommandKind::AddSlide { index, slide }
            | CommandKind::DuplicateSlide { index, slide } => {
                document.slides.insert(*index, slide.clone());
            }
            CommandKind::DeleteSlide { index, .. } => {
                document.slides.remove(*index);
            }
            CommandKind::UpdateSlide { after, .. } | CommandKind::ApplyTemplate { after, .. } => {
                replace_slide(document, after);
            }
            CommandKind::ApplyTemplateAll { after, .. }
            | CommandKind::ReplaceAllSlides { after, .. } => {
                document.slides = after.clone();
            }
        }
    }

    /// Applies the stored inverse, restoring the pre-command state.
    pub(crate) fn revert(&self, document: &mut Document) {
        match &self.kind {
            CommandKind::AddSlide { index, .. } | CommandKind::DuplicateSlide { index, .. } => {
                document.slides.remove(*index);
            }
            CommandKind::DeleteSlide { index, slide } => {
                document.slides.insert(*index, slide.clone());
            }
            CommandKind::UpdateSlide { before, .. } | CommandKind::ApplyTemplate { before, .. } => {
                replace_slide(document, before);
            }
            CommandKind::ApplyTemplateAll { before, .. }
            | CommandKind::ReplaceAllSlides { before, .. } => {
                document.slides = before.clone();
            }
        }
    }
}

fn replace_slide(document: &mut Document, snapshot: &Slide) {
    if let Some(index) = document.index_of(snapshot.id) {
        document.slides[index] = snapshot.clone();
    }
}
