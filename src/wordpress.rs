//! Import of a published WordPress article through its REST API.
//!
//! Only the post lookup can fail the import. Category, featured media and
//! image download are best effort: failures are logged and the field is left
//! empty.

use crate::config;
use crate::imaging::to_data_url;
use crate::model::Change;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::{Client, Url};
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

/// Import failures. The messages are shown to the user as-is.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ImportError {
    #[error("URL invalide")]
    InvalidUrl,
    #[error("API WordPress non disponible sur ce site")]
    ApiUnavailable,
    #[error("Article non trouvé")]
    NotFound,
    #[error("Impossible de contacter le site WordPress")]
    Unreachable,
}

/// Category slug to rubric.
const RUBRIC_MAPPING: &[(&str, &str)] = &[
    ("actu", "actu"),
    ("edito", "édito"),
    ("ailleurs", "ailleurs"),
    ("pop", "pop !"),
    ("comprendre", "comprendre"),
    ("dossier", "dossier"),
    ("au-cas-ou", "au cas où"),
];

const HTML_ENTITIES: &[(&str, &str)] = &[
    ("nbsp", "\u{a0}"),
    ("amp", "&"),
    ("lt", "<"),
    ("gt", ">"),
    ("quot", "\""),
    ("apos", "'"),
    ("agrave", "à"),
    ("acirc", "â"),
    ("auml", "ä"),
    ("eacute", "é"),
    ("egrave", "è"),
    ("ecirc", "ê"),
    ("euml", "ë"),
    ("iacute", "í"),
    ("igrave", "ì"),
    ("icirc", "î"),
    ("iuml", "ï"),
    ("oacute", "ó"),
    ("ograve", "ò"),
    ("ocirc", "ô"),
    ("ouml", "ö"),
    ("uacute", "ú"),
    ("ugrave", "ù"),
    ("ucirc", "û"),
    ("uuml", "ü"),
    ("ccedil", "ç"),
    ("oelig", "œ"),
    ("aelig", "æ"),
    ("ndash", "\u{2013}"),
    ("mdash", "\u{2014}"),
    ("lsquo", "\u{2018}"),
    ("rsquo", "\u{2019}"),
    ("ldquo", "\u{201c}"),
    ("rdquo", "\u{201d}"),
    ("hellip", "\u{2026}"),
    ("laquo", "\u{ab}"),
    ("raquo", "\u{bb}"),
];

static DECIMAL_ENTITY: Lazy<Regex> = Lazy::new(|| Regex::new(r"&#(\d+);").unwrap());
static HEX_ENTITY: Lazy<Regex> = Lazy::new(|| Regex::new(r"&#x([0-9a-fA-F]+);").unwrap());
static NAMED_ENTITY: Lazy<Regex> = Lazy::new(|| Regex::new(r"&([a-zA-Z]+);").unwrap());
static TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]*>").unwrap());
static PARAGRAPH_BREAK: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)</p>\s*<p[^>]*>").unwrap());
static LINE_BREAK: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)<br\s*/?>").unwrap());
static BLOCK_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)</?(p|div)[^>]*>").unwrap());
static EXTRA_NEWLINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").unwrap());
static SCALED_SUFFIX: Lazy<Regex> = Lazy::new(|| Regex::new(r"-scaled(\.[^.]+)$").unwrap());
static EDITED_SUFFIX: Lazy<Regex> = Lazy::new(|| Regex::new(r"-e\d+(\.[^.]+)$").unwrap());

/// Site origin and post slug extracted from an article URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArticleLocation {
    pub origin: String,
    pub slug: String,
}

impl ArticleLocation {
    /// `{origin}/wp-json/wp/v2/posts?slug={slug}`
    pub fn posts_endpoint(&self) -> Result<Url, ImportError> {
        let mut url = Url::parse(&format!("{}/wp-json/wp/v2/posts", self.origin))
            .map_err(|_| ImportError::InvalidUrl)?;
        url.query_pairs_mut().append_pair("slug", &self.slug);
        Ok(url)
    }

    fn api(&self, path: &str) -> String {
        format!("{}/wp-json/wp/v2/{}", self.origin, path)
    }
}

/// The slug is the last non-empty path segment.
pub fn parse_article_url(raw: &str) -> Result<ArticleLocation, ImportError> {
    let url = Url::parse(raw.trim()).map_err(|_| ImportError::InvalidUrl)?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ImportError::InvalidUrl);
    }
    let slug = url
        .path_segments()
        .and_then(|segments| segments.filter(|s| !s.is_empty()).last())
        .ok_or(ImportError::InvalidUrl)?
        .to_string();
    Ok(ArticleLocation {
        origin: url.origin().ascii_serialization(),
        slug,
    })
}

pub fn decode_html_entities(text: &str) -> String {
    let text = DECIMAL_ENTITY.replace_all(text, |caps: &regex::Captures| {
        numeric_entity(&caps[1], 10).unwrap_or_else(|| caps[0].to_string())
    });
    let text = HEX_ENTITY.replace_all(&text, |caps: &regex::Captures| {
        numeric_entity(&caps[1], 16).unwrap_or_else(|| caps[0].to_string())
    });
    NAMED_ENTITY
        .replace_all(&text, |caps: &regex::Captures| {
            HTML_ENTITIES
                .iter()
                .find(|(name, _)| *name == &caps[1])
                .map(|(_, value)| value.to_string())
                .unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

fn numeric_entity(digits: &str, radix: u32) -> Option<String> {
    u32::from_str_radix(digits, radix)
        .ok()
        .and_then(char::from_u32)
        .map(String::from)
}

/// Drop every tag, decode entities, trim.
pub fn strip_html_tags(html: &str) -> String {
    decode_html_entities(&TAG.replace_all(html, "")).trim().to_string()
}

/// Paragraphs become blank-line separated, `<br>` a newline.
pub fn html_to_plain_text(html: &str) -> String {
    let text = PARAGRAPH_BREAK.replace_all(html, "\n\n");
    let text = LINE_BREAK.replace_all(&text, "\n");
    let text = BLOCK_TAG.replace_all(&text, "\n");
    let text = TAG.replace_all(&text, "");
    let text = decode_html_entities(&text);
    EXTRA_NEWLINES.replace_all(&text, "\n\n").trim().to_string()
}

pub fn rubric_for_category(slug: &str) -> Option<&'static str> {
    let slug = slug.to_lowercase();
    RUBRIC_MAPPING
        .iter()
        .find(|(category, _)| *category == slug)
        .map(|(_, rubric)| *rubric)
}

/// Source URL without the `-scaled` / `-e<digits>` suffixes WordPress adds
/// to processed uploads.
pub fn original_image_url(source_url: &str) -> String {
    let url = SCALED_SUFFIX.replace(source_url, "$1");
    EDITED_SUFFIX.replace(&url, "$1").into_owned()
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Rendered {
    #[serde(default)]
    pub rendered: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PostPayload {
    #[serde(default)]
    pub title: Option<Rendered>,
    #[serde(default)]
    pub content: Option<Rendered>,
    #[serde(default)]
    pub excerpt: Option<Rendered>,
    #[serde(default)]
    pub link: Option<String>,
    #[serde(default)]
    pub categories: Vec<i64>,
    #[serde(default)]
    pub featured_media: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
struct CategoryPayload {
    slug: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct MediaPayload {
    caption: Option<Rendered>,
    source_url: Option<String>,
}

/// Everything an import can fill in.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportedArticle {
    pub title: String,
    pub content: String,
    pub legend: String,
    pub article_url: String,
    pub rubric: Option<String>,
    pub image_caption: Option<String>,
    /// `data:` URL of the featured image as downloaded.
    pub image_data_url: Option<String>,
}

impl ImportedArticle {
    /// Text fields of a post; category and media are resolved separately.
    pub fn from_post(post: &PostPayload) -> Self {
        let rendered = |r: &Option<Rendered>| {
            r.as_ref().map(|r| r.rendered.clone()).unwrap_or_default()
        };
        Self {
            title: strip_html_tags(&rendered(&post.title)),
            content: html_to_plain_text(&rendered(&post.content)),
            legend: strip_html_tags(&rendered(&post.excerpt)),
            article_url: post.link.clone().unwrap_or_default(),
            ..Self::default()
        }
    }

    /// Field changes for the record, image excluded.
    ///
    /// The rubric is only set when the category mapped to one; the body text
    /// replaces all slides when `with_content` is set.
    pub fn changes(&self, with_content: bool) -> Vec<Change> {
        let mut changes = vec![Change::Title(self.title.clone())];
        if with_content {
            let slides = if self.content.trim().is_empty() {
                Vec::new()
            } else {
                vec![self.content.clone()]
            };
            changes.push(Change::Slides(slides));
        }
        if let Some(rubric) = &self.rubric {
            changes.push(Change::Rubric(rubric.clone()));
        }
        changes.push(Change::Legend(self.legend.clone()));
        changes.push(Change::ArticleUrl(
            Some(self.article_url.clone()).filter(|u| !u.is_empty()),
        ));
        changes.push(Change::ImageCaption(self.image_caption.clone()));
        changes
    }
}

/// Something that can turn an article URL into importable fields.
#[async_trait]
pub trait ArticleSource: Send + Sync {
    async fn import(&self, url: &str) -> Result<ImportedArticle, ImportError>;
}

#[derive(Debug, Clone)]
pub struct WordPressClient {
    http: Client,
}

impl WordPressClient {
    pub fn new(http: Client) -> Self {
        Self { http }
    }

    pub fn from_config(cfg: &config::WordPress) -> Result<Self, reqwest::Error> {
        let http = Client::builder()
            .user_agent(cfg.user_agent.clone())
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .no_proxy()
            .build()?;
        Ok(Self::new(http))
    }

    async fn fetch_post(&self, location: &ArticleLocation) -> Result<PostPayload, ImportError> {
        let endpoint = location.posts_endpoint()?;
        let res = self.http.get(endpoint).send().await.map_err(|err| {
            warn!(?err, "WordPress request failed");
            ImportError::Unreachable
        })?;
        if !res.status().is_success() {
            warn!(status = %res.status(), "WordPress API answered with an error");
            return Err(ImportError::ApiUnavailable);
        }
        let posts: Vec<PostPayload> = res.json().await.map_err(|err| {
            warn!(?err, "invalid WordPress posts payload");
            ImportError::Unreachable
        })?;
        posts.into_iter().next().ok_or(ImportError::NotFound)
    }

    async fn fetch_rubric(&self, location: &ArticleLocation, category: i64) -> Option<String> {
        let url = location.api(&format!("categories/{category}"));
        let res = self.http.get(url).send().await.ok()?;
        if !res.status().is_success() {
            debug!(category, status = %res.status(), "category lookup failed");
            return None;
        }
        let category: CategoryPayload = res.json().await.ok()?;
        rubric_for_category(category.slug.as_deref()?).map(str::to_string)
    }

    /// Caption and image data URL of the featured media.
    async fn fetch_media(&self, location: &ArticleLocation, media: i64) -> (Option<String>, Option<String>) {
        let url = location.api(&format!("media/{media}"));
        let payload = match self.http.get(url).send().await {
            Ok(res) if res.status().is_success() => res.json::<MediaPayload>().await.ok(),
            _ => None,
        };
        let Some(payload) = payload else {
            debug!(media, "featured media lookup failed");
            return (None, None);
        };
        let caption = payload
            .caption
            .map(|c| strip_html_tags(&c.rendered))
            .filter(|c| !c.is_empty());
        let image = match payload.source_url {
            Some(source) => self.download_image(&source).await,
            None => None,
        };
        (caption, image)
    }

    async fn download_image(&self, source_url: &str) -> Option<String> {
        let url = self.preferred_image_url(source_url).await;
        let res = match self.http.get(&url).send().await {
            Ok(res) if res.status().is_success() => res,
            Ok(res) => {
                debug!(url = %url, status = %res.status(), "image download refused");
                return None;
            }
            Err(err) => {
                debug!(?err, url = %url, "image download failed");
                return None;
            }
        };
        let mime = res
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("image/jpeg")
            .to_string();
        let bytes = res.bytes().await.ok()?;
        Some(to_data_url(&bytes, &mime))
    }

    /// The unprocessed upload when the server has it, else `source_url`.
    async fn preferred_image_url(&self, source_url: &str) -> String {
        let original = original_image_url(source_url);
        if original != source_url {
            if let Ok(res) = self.http.head(&original).send().await {
                if res.status().is_success() {
                    return original;
                }
            }
        }
        source_url.to_string()
    }
}

#[async_trait]
impl ArticleSource for WordPressClient {
    #[instrument(skip_all, fields(url = %url))]
    async fn import(&self, url: &str) -> Result<ImportedArticle, ImportError> {
        let location = parse_article_url(url)?;
        let post = self.fetch_post(&location).await?;
        let mut article = ImportedArticle::from_post(&post);

        if let Some(&category) = post.categories.first() {
            article.rubric = self.fetch_rubric(&location, category).await;
        }
        if let Some(media) = post.featured_media.filter(|&m| m > 0) {
            let (caption, image) = self.fetch_media(&location, media).await;
            article.image_caption = caption;
            article.image_data_url = image;
        }

        info!(
            slug = %location.slug,
            rubric = ?article.rubric,
            has_image = article.image_data_url.is_some(),
            "imported WordPress article"
        );
        Ok(article)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_origin_and_slug() {
        let loc = parse_article_url("https://example.org/2024/05/mon-article/").unwrap();
        assert_eq!(loc.origin, "https://example.org");
        assert_eq!(loc.slug, "mon-article");
        assert_eq!(
            loc.posts_endpoint().unwrap().as_str(),
            "https://example.org/wp-json/wp/v2/posts?slug=mon-article"
        );
    }

    #[test]
    fn keeps_port_in_origin() {
        let loc = parse_article_url("http://127.0.0.1:8080/a").unwrap();
        assert_eq!(loc.origin, "http://127.0.0.1:8080");
    }

    #[test]
    fn rejects_bad_urls() {
        assert_eq!(parse_article_url("pas une url"), Err(ImportError::InvalidUrl));
        assert_eq!(parse_article_url("https://example.org/"), Err(ImportError::InvalidUrl));
        assert_eq!(parse_article_url("ftp://example.org/x"), Err(ImportError::InvalidUrl));
    }

    #[test]
    fn error_messages() {
        assert_eq!(ImportError::InvalidUrl.to_string(), "URL invalide");
        assert_eq!(ImportError::NotFound.to_string(), "Article non trouvé");
        assert_eq!(
            ImportError::ApiUnavailable.to_string(),
            "API WordPress non disponible sur ce site"
        );
        assert_eq!(
            ImportError::Unreachable.to_string(),
            "Impossible de contacter le site WordPress"
        );
    }

    #[test]
    fn decodes_entities() {
        assert_eq!(decode_html_entities("l&rsquo;&eacute;t&eacute; &#8211; &#x41;"), "l\u{2019}été \u{2013} A");
        assert_eq!(decode_html_entities("&unknown; &amp;"), "&unknown; &");
    }

    #[test]
    fn strips_tags() {
        assert_eq!(strip_html_tags("<p>Un <em>titre</em>&nbsp;!</p>\n"), "Un titre\u{a0}!");
    }

    #[test]
    fn html_paragraphs_to_text() {
        let html = "<p>Premier.</p>\n<p class=\"x\">Second<br/>ligne</p><div></div><div></div><p>Fin</p>";
        assert_eq!(html_to_plain_text(html), "Premier.\n\nSecond\nligne\n\nFin");
    }

    #[test]
    fn maps_rubrics() {
        assert_eq!(rubric_for_category("edito"), Some("édito"));
        assert_eq!(rubric_for_category("Au-Cas-Ou"), Some("au cas où"));
        assert_eq!(rubric_for_category("pop"), Some("pop !"));
        assert_eq!(rubric_for_category("sport"), None);
    }

    #[test]
    fn strips_wordpress_image_suffixes() {
        assert_eq!(original_image_url("https://x/a/photo-scaled.jpg"), "https://x/a/photo.jpg");
        assert_eq!(original_image_url("https://x/a/photo-e1700000000.png"), "https://x/a/photo.png");
        assert_eq!(original_image_url("https://x/a/photo.jpg"), "https://x/a/photo.jpg");
    }

    #[test]
    fn article_from_post_payload() {
        let post: PostPayload = serde_json::from_str(
            r#"{
                "title": {"rendered": "L&#8217;article"},
                "content": {"rendered": "<p>Un.</p><p>Deux.</p>"},
                "excerpt": {"rendered": "<p>Résumé</p>\n"},
                "link": "https://example.org/article/",
                "categories": [3],
                "featured_media": 0
            }"#,
        )
        .unwrap();
        let article = ImportedArticle::from_post(&post);
        assert_eq!(article.title, "L\u{2019}article");
        assert_eq!(article.content, "Un.\n\nDeux.");
        assert_eq!(article.legend, "Résumé");
        assert_eq!(article.article_url, "https://example.org/article/");
    }

    #[test]
    fn changes_respect_content_flag() {
        let article = ImportedArticle {
            title: "T".into(),
            content: "Corps".into(),
            rubric: None,
            ..Default::default()
        };
        let without = article.changes(false);
        assert!(!without.iter().any(|c| matches!(c, Change::Slides(_))));
        assert!(!without.iter().any(|c| matches!(c, Change::Rubric(_))));
        assert!(without.contains(&Change::ArticleUrl(None)));

        let with = article.changes(true);
        assert!(with.contains(&Change::Slides(vec!["Corps".into()])));
    }
}
