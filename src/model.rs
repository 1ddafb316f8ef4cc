use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Rubrics offered by the editor, in display order.
pub const RUBRICS: &[&str] = &[
    "édito",
    "actu",
    "ailleurs",
    "pop !",
    "comprendre",
    "dossier",
    "au cas où",
];

pub const DEFAULT_RUBRIC: &str = "édito";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ModelError {
    #[error("unknown field: {0}")]
    UnknownField(String),
    #[error("invalid value for {field}: {value}")]
    InvalidValue { field: &'static str, value: String },
}

/// Output format; every slide of a record shares the same canvas.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    #[default]
    Post,
    Story,
}

/// Tallest canvas across formats; uploaded images are downsized to it.
pub const MAX_FORMAT_HEIGHT: u32 = 1920;

impl Format {
    pub fn as_str(&self) -> &'static str {
        match self {
            Format::Post => "post",
            Format::Story => "story",
        }
    }

    /// Canvas size in logical pixels (width, height).
    pub fn dimensions(&self) -> (u32, u32) {
        match self {
            Format::Post => (1080, 1350),
            Format::Story => (1080, 1920),
        }
    }
}

impl FromStr for Format {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "post" => Ok(Format::Post),
            "story" => Ok(Format::Story),
            other => Err(ModelError::InvalidValue {
                field: "format",
                value: other.to_string(),
            }),
        }
    }
}

/// Where the title block sits on the first slide.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum TextPosition {
    #[default]
    Top,
    Bottom,
}

impl TextPosition {
    pub fn as_str(&self) -> &'static str {
        match self {
            TextPosition::Top => "top",
            TextPosition::Bottom => "bottom",
        }
    }
}

impl FromStr for TextPosition {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "top" => Ok(TextPosition::Top),
            "bottom" => Ok(TextPosition::Bottom),
            other => Err(ModelError::InvalidValue {
                field: "position",
                value: other.to_string(),
            }),
        }
    }
}

/// The persisted unit: everything needed to rebuild a carousel.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Record {
    pub id: String,
    pub title: String,
    pub intro: String,
    pub rubric: String,
    /// PNG/JPEG data URL.
    pub image: Option<String>,
    pub image_x: f64,
    pub position: TextPosition,
    /// Body text, one entry per content slide. Never contains blank entries.
    pub slides: Vec<String>,
    pub subscribe: bool,
    pub issue_number: i64,
    pub format: Format,
    pub legend: String,
    pub image_caption: Option<String>,
    pub article_url: Option<String>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Record {
    /// Empty record returned by the store for unknown ids.
    pub fn empty(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: String::new(),
            intro: String::new(),
            rubric: DEFAULT_RUBRIC.to_string(),
            image: None,
            image_x: 0.0,
            position: TextPosition::Top,
            slides: Vec::new(),
            subscribe: false,
            issue_number: 1,
            format: Format::Post,
            legend: String::new(),
            image_caption: None,
            article_url: None,
            updated_at: None,
        }
    }

    /// Number of rendered stages: first slide, content slides, subscribe slide.
    pub fn stage_count(&self) -> usize {
        1 + self.slides.len() + usize::from(self.subscribe)
    }
}

/// Field keys of a [`Record`] that can be edited independently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    Title,
    Intro,
    Rubric,
    Image,
    ImageX,
    Position,
    Slides,
    Subscribe,
    IssueNumber,
    Format,
    Legend,
    ImageCaption,
    ArticleUrl,
}

impl Field {
    pub const ALL: [Field; 13] = [
        Field::Title,
        Field::Intro,
        Field::Rubric,
        Field::Image,
        Field::ImageX,
        Field::Position,
        Field::Slides,
        Field::Subscribe,
        Field::IssueNumber,
        Field::Format,
        Field::Legend,
        Field::ImageCaption,
        Field::ArticleUrl,
    ];

    /// Column name in the `records` table; also the CLI spelling.
    pub fn as_str(&self) -> &'static str {
        match self {
            Field::Title => "title",
            Field::Intro => "intro",
            Field::Rubric => "rubric",
            Field::Image => "image",
            Field::ImageX => "image_x",
            Field::Position => "position",
            Field::Slides => "slides",
            Field::Subscribe => "subscribe",
            Field::IssueNumber => "issue_number",
            Field::Format => "format",
            Field::Legend => "legend",
            Field::ImageCaption => "image_caption",
            Field::ArticleUrl => "article_url",
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Field {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Field::ALL
            .into_iter()
            .find(|f| f.as_str() == s)
            .ok_or_else(|| ModelError::UnknownField(s.to_string()))
    }
}

/// A new value for one field. The field key is implied by the variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "field", content = "value", rename_all = "snake_case")]
pub enum Change {
    Title(String),
    Intro(String),
    Rubric(String),
    Image(Option<String>),
    ImageX(f64),
    Position(TextPosition),
    Slides(Vec<String>),
    Subscribe(bool),
    IssueNumber(i64),
    Format(Format),
    Legend(String),
    ImageCaption(Option<String>),
    ArticleUrl(Option<String>),
}

impl Change {
    pub fn field(&self) -> Field {
        match self {
            Change::Title(_) => Field::Title,
            Change::Intro(_) => Field::Intro,
            Change::Rubric(_) => Field::Rubric,
            Change::Image(_) => Field::Image,
            Change::ImageX(_) => Field::ImageX,
            Change::Position(_) => Field::Position,
            Change::Slides(_) => Field::Slides,
            Change::Subscribe(_) => Field::Subscribe,
            Change::IssueNumber(_) => Field::IssueNumber,
            Change::Format(_) => Field::Format,
            Change::Legend(_) => Field::Legend,
            Change::ImageCaption(_) => Field::ImageCaption,
            Change::ArticleUrl(_) => Field::ArticleUrl,
        }
    }

    pub fn apply(&self, record: &mut Record) {
        match self {
            Change::Title(v) => record.title = v.clone(),
            Change::Intro(v) => record.intro = v.clone(),
            Change::Rubric(v) => record.rubric = v.clone(),
            Change::Image(v) => record.image = v.clone(),
            Change::ImageX(v) => record.image_x = *v,
            Change::Position(v) => record.position = *v,
            Change::Slides(v) => record.slides = v.clone(),
            Change::Subscribe(v) => record.subscribe = *v,
            Change::IssueNumber(v) => record.issue_number = *v,
            Change::Format(v) => record.format = *v,
            Change::Legend(v) => record.legend = v.clone(),
            Change::ImageCaption(v) => record.image_caption = v.clone(),
            Change::ArticleUrl(v) => record.article_url = v.clone(),
        }
    }

    /// Parse a textual value for `field`. Empty strings clear nullable fields.
    /// Slides are given as a JSON array of strings.
    pub fn parse(field: Field, raw: &str) -> Result<Self, ModelError> {
        let invalid = || ModelError::InvalidValue {
            field: field.as_str(),
            value: raw.to_string(),
        };
        let optional = |s: &str| (!s.is_empty()).then(|| s.to_string());
        Ok(match field {
            Field::Title => Change::Title(raw.to_string()),
            Field::Intro => Change::Intro(raw.to_string()),
            Field::Rubric => Change::Rubric(raw.to_string()),
            Field::Image => Change::Image(optional(raw)),
            Field::ImageX => Change::ImageX(raw.parse().map_err(|_| invalid())?),
            Field::Position => Change::Position(raw.parse()?),
            Field::Slides => {
                let slides: Vec<String> = serde_json::from_str(raw).map_err(|_| invalid())?;
                Change::Slides(slides.into_iter().filter(|s| !s.trim().is_empty()).collect())
            }
            Field::Subscribe => Change::Subscribe(match raw {
                "true" | "1" | "yes" => true,
                "false" | "0" | "no" => false,
                _ => return Err(invalid()),
            }),
            // The editor only accepts positive issue numbers.
            Field::IssueNumber => match raw.parse::<i64>() {
                Ok(n) if n > 0 => Change::IssueNumber(n),
                _ => return Err(invalid()),
            },
            Field::Format => Change::Format(raw.parse()?),
            Field::Legend => Change::Legend(raw.to_string()),
            Field::ImageCaption => Change::ImageCaption(optional(raw)),
            Field::ArticleUrl => Change::ArticleUrl(optional(raw)),
        })
    }
}

/// Latest unsaved value per field. Inserting a change for a field that is
/// already pending replaces it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PendingChanges(BTreeMap<Field, Change>);

impl PendingChanges {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, change: Change) {
        self.0.insert(change.field(), change);
    }

    pub fn contains(&self, field: Field) -> bool {
        self.0.contains_key(&field)
    }

    pub fn get(&self, field: Field) -> Option<&Change> {
        self.0.get(&field)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn fields(&self) -> impl Iterator<Item = Field> + '_ {
        self.0.keys().copied()
    }

    pub fn changes(&self) -> impl Iterator<Item = &Change> {
        self.0.values()
    }

    /// Re-queue `older` entries whose field has not been changed since.
    pub fn merge_older(&mut self, older: PendingChanges) {
        for (field, change) in older.0 {
            self.0.entry(field).or_insert(change);
        }
    }
}

impl FromIterator<Change> for PendingChanges {
    fn from_iter<I: IntoIterator<Item = Change>>(iter: I) -> Self {
        let mut pending = PendingChanges::new();
        for change in iter {
            pending.insert(change);
        }
        pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_record_defaults() {
        let r = Record::empty("abc");
        assert_eq!(r.rubric, "édito");
        assert_eq!(r.issue_number, 1);
        assert_eq!(r.format, Format::Post);
        assert_eq!(r.stage_count(), 1);
    }

    #[test]
    fn stage_count_includes_subscribe_slide() {
        let mut r = Record::empty("abc");
        r.slides = vec!["a".into(), "b".into()];
        r.subscribe = true;
        assert_eq!(r.stage_count(), 4);
    }

    #[test]
    fn field_names_round_trip() {
        for f in Field::ALL {
            assert_eq!(f.as_str().parse::<Field>().unwrap(), f);
        }
        assert!(matches!("nope".parse::<Field>(), Err(ModelError::UnknownField(_))));
    }

    #[test]
    fn parse_changes() {
        assert_eq!(
            Change::parse(Field::Format, "story").unwrap(),
            Change::Format(Format::Story)
        );
        assert_eq!(
            Change::parse(Field::ImageCaption, "").unwrap(),
            Change::ImageCaption(None)
        );
        assert_eq!(
            Change::parse(Field::Slides, r#"["a", "  ", "b"]"#).unwrap(),
            Change::Slides(vec!["a".into(), "b".into()])
        );
        assert!(Change::parse(Field::IssueNumber, "0").is_err());
        assert!(Change::parse(Field::Subscribe, "maybe").is_err());
    }

    #[test]
    fn apply_sets_only_its_field() {
        let mut r = Record::empty("x");
        Change::Title("Hello".into()).apply(&mut r);
        Change::Position(TextPosition::Bottom).apply(&mut r);
        assert_eq!(r.title, "Hello");
        assert_eq!(r.position, TextPosition::Bottom);
        assert_eq!(r.intro, "");
    }

    #[test]
    fn pending_keeps_latest_per_field() {
        let mut pending = PendingChanges::new();
        pending.insert(Change::Title("a".into()));
        pending.insert(Change::Title("b".into()));
        pending.insert(Change::Subscribe(true));
        assert_eq!(pending.len(), 2);
        assert_eq!(pending.get(Field::Title), Some(&Change::Title("b".into())));

        let older: PendingChanges =
            [Change::Title("stale".into()), Change::Intro("kept".into())].into_iter().collect();
        pending.merge_older(older);
        assert_eq!(pending.get(Field::Title), Some(&Change::Title("b".into())));
        assert_eq!(pending.get(Field::Intro), Some(&Change::Intro("kept".into())));
    }

    #[test]
    fn format_dimensions() {
        assert_eq!(Format::Post.dimensions(), (1080, 1350));
        assert_eq!(Format::Story.dimensions(), (1080, 1920));
    }
}
