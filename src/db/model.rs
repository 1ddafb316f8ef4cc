//! Row mapping between the `records` table and [`Record`].
//!
//! Keep this focused on conversion; the SQL lives in `repo`.

use super::StoreError;
use crate::model::{Change, Record};
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

/// A single column value ready to bind.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnValue {
    Text(String),
    OptionalText(Option<String>),
    Real(f64),
    Integer(i64),
    Bool(bool),
}

impl ColumnValue {
    pub fn from_change(change: &Change) -> Result<Self, StoreError> {
        Ok(match change {
            Change::Title(v) | Change::Intro(v) | Change::Rubric(v) | Change::Legend(v) => {
                ColumnValue::Text(v.clone())
            }
            Change::Image(v) | Change::ImageCaption(v) | Change::ArticleUrl(v) => {
                ColumnValue::OptionalText(v.clone())
            }
            Change::ImageX(v) => ColumnValue::Real(*v),
            Change::Position(v) => ColumnValue::Text(v.as_str().to_string()),
            Change::Slides(v) => ColumnValue::Text(serde_json::to_string(v)?),
            Change::Subscribe(v) => ColumnValue::Bool(*v),
            Change::IssueNumber(v) => ColumnValue::Integer(*v),
            Change::Format(v) => ColumnValue::Text(v.as_str().to_string()),
        })
    }
}

pub fn record_from_row(row: &SqliteRow) -> Result<Record, StoreError> {
    let position: String = row.try_get("position")?;
    let format: String = row.try_get("format")?;
    let slides: String = row.try_get("slides")?;
    let updated_at: Option<DateTime<Utc>> = row.try_get("updated_at")?;

    Ok(Record {
        id: row.try_get("id")?,
        title: row.try_get("title")?,
        intro: row.try_get("intro")?,
        rubric: row.try_get("rubric")?,
        image: row.try_get("image")?,
        image_x: row.try_get("image_x")?,
        position: position.parse().map_err(|e| StoreError::decode("position", e))?,
        slides: serde_json::from_str(&slides).map_err(|e| StoreError::decode("slides", e))?,
        subscribe: row.try_get("subscribe")?,
        issue_number: row.try_get("issue_number")?,
        format: format.parse().map_err(|e| StoreError::decode("format", e))?,
        legend: row.try_get("legend")?,
        image_caption: row.try_get("image_caption")?,
        article_url: row.try_get("article_url")?,
        updated_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Format, TextPosition};

    #[test]
    fn change_to_column_value() {
        assert_eq!(
            ColumnValue::from_change(&Change::Slides(vec!["a".into(), "b\"c".into()])).unwrap(),
            ColumnValue::Text(r#"["a","b\"c"]"#.into())
        );
        assert_eq!(
            ColumnValue::from_change(&Change::Position(TextPosition::Bottom)).unwrap(),
            ColumnValue::Text("bottom".into())
        );
        assert_eq!(
            ColumnValue::from_change(&Change::Format(Format::Story)).unwrap(),
            ColumnValue::Text("story".into())
        );
        assert_eq!(
            ColumnValue::from_change(&Change::ArticleUrl(None)).unwrap(),
            ColumnValue::OptionalText(None)
        );
    }
}
