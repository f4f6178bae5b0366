use serde::{Deserialize, Serialize};
use ts_rs::TS;
use uuid::Uuid;

use crate::DocumentId;

pub type SlideId = Uuid;

/// Canvas layouts the renderer understands.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, TS, PartialEq, Eq)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum SlideLayout {
    Title,
    Content,
    Choice,
    Poll,
}

/// Presentation attributes carried on every slide.
///
/// The editing core copies these wholesale; only templates ever interpret
/// the styling subset. Attachments (images, shapes) stay opaque JSON.
#[derive(Debug, Clone, Default, Serialize, Deserialize, TS, PartialEq)]
#[ts(export)]
pub struct SlideStyle {
    pub background: Option<String>,
    pub text_color: Option<String>,
    pub accent_color: Option<String>,
    pub font_family: Option<String>,
    pub font_size: Option<u32>,
    #[ts(type = "unknown[]")]
    pub attachments: Vec<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, PartialEq)]
#[ts(export)]
pub struct Slide {
    pub id: SlideId,
    pub title: String,
    pub subtitle: Option<String>,
    pub content: Option<String>,
    pub layout: SlideLayout,
    pub style: SlideStyle,
}

impl Slide {
    /// The blank slide inserted by the toolbar's "add" action.
    pub fn blank() -> Self {
        Self {
            id: Uuid::new_v4(),
            title: String::new(),
            subtitle: None,
            content: None,
            layout: SlideLayout::Content,
            style: SlideStyle::default(),
        }
    }

    /// Deep copy with a fresh id, identical content otherwise.
    pub fn duplicate(&self) -> Self {
        let mut copy = self.clone();
        copy.id = Uuid::new_v4();
        copy
    }
}

/// Partial update for a slide. Fields left as `None` are untouched;
/// provided fields replace the slide's current value wholesale.
#[derive(Debug, Clone, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct SlideUpdate {
    pub title: Option<String>,
    pub subtitle: Option<String>,
    pub content: Option<String>,
    pub layout: Option<SlideLayout>,
    pub style: Option<SlideStyle>,
}

impl SlideUpdate {
    pub fn title(value: impl Into<String>) -> Self {
        Self {
            title: Some(value.into()),
            ..Self::default()
        }
    }

    /// Shallow merge into `slide`: only the fields present here change.
    pub(crate) fn merge_into(&self, slide: &mut Slide) {
        if let Some(title) = &self.title {
            slide.title = title.clone();
        }
        if let Some(subtitle) = &self.subtitle {
            slide.subtitle = Some(subtitle.clone());
        }
        if let Some(content) = &self.content {
            slide.content = Some(content.clone());
        }
        if let Some(layout) = self.layout {
            slide.layout = layout;
        }
        if let Some(style) = &self.style {
            slide.style = style.clone();
        }
    }
}

/// Styling-only preset applied by the template picker. Never touches
/// text, layout or attachments.
#[derive(Debug, Clone, Serialize, Deserialize, TS, PartialEq)]
#[ts(export)]
pub struct Template {
    pub background: String,
    pub text_color: String,
    pub accent_color: String,
}

impl Template {
    pub(crate) fn apply_to(&self, slide: &mut Slide) {
        slide.style.background = Some(self.background.clone());
        slide.style.text_color = Some(self.text_color.clone());
        slide.style.accent_color = Some(self.accent_color.clone());
    }
}

/// The object under edit: an ordered slide list plus metadata.
/// Order is the canonical rendering order. Never empty.
#[derive(Debug, Clone, Serialize, Deserialize, TS, PartialEq)]
#[ts(export)]
pub struct Document {
    pub id: DocumentId,
    pub title: String,
    pub slides: Vec<Slide>,
}

impl Document {
    /// A new document starts with a single blank title slide.
    pub fn new(id: impl Into<DocumentId>, title: impl Into<String>) -> Self {
        let mut first = Slide::blank();
        first.layout = SlideLayout::Title;
        Self {
            id: id.into(),
            title: title.into(),
            slides: vec![first],
        }
    }

    pub fn slide(&self, id: SlideId) -> Option<&Slide> {
        self.slides.iter().find(|s| s.id == id)
    }

    pub(crate) fn index_of(&self, id: SlideId) -> Option<usize> {
        self.slides.iter().position(|s| s.id == id)
    }
}
