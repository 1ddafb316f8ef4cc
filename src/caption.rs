//! Ready-to-paste captions for sharing a carousel.
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    Instagram,
    WhatsApp,
    /// Also used for Mastodon.
    Bluesky,
}

impl Network {
    pub const ALL: [Network; 3] = [Network::Instagram, Network::WhatsApp, Network::Bluesky];

    pub fn as_str(&self) -> &'static str {
        match self {
            Network::Instagram => "instagram",
            Network::WhatsApp => "whatsapp",
            Network::Bluesky => "bluesky",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Network::Instagram => "Instagram",
            Network::WhatsApp => "WhatsApp",
            Network::Bluesky => "Bluesky / Mastodon",
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Network {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "instagram" => Ok(Network::Instagram),
            "whatsapp" => Ok(Network::WhatsApp),
            "bluesky" | "mastodon" => Ok(Network::Bluesky),
            other => Err(format!("unknown network: {other}")),
        }
    }
}

fn read_more(url: &str) -> String {
    format!("💡 À lire sur notre site : {url}")
}

/// Caption text for `network`. The legend is trimmed; empty credit and URL
/// are treated as absent.
pub fn generate_caption(
    network: Network,
    legend: &str,
    image_caption: Option<&str>,
    article_url: Option<&str>,
) -> String {
    let content = legend.trim();
    let credit = image_caption.filter(|c| !c.is_empty());
    let url = article_url.filter(|u| !u.is_empty());

    match network {
        Network::Instagram => match credit {
            Some(credit) => format!("{content}\n\n{credit}"),
            None => content.to_string(),
        },
        Network::WhatsApp => {
            let mut parts = vec!["📰 Nouvel article !".to_string(), String::new(), format!("_{content}_")];
            if let Some(url) = url {
                parts.push(String::new());
                parts.push(read_more(url));
            }
            parts.join("\n")
        }
        Network::Bluesky => {
            let mut parts = vec![content.to_string()];
            if let Some(url) = url {
                parts.push(String::new());
                parts.push(read_more(url));
            }
            parts.join("\n")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instagram_appends_credit() {
        assert_eq!(
            generate_caption(Network::Instagram, "  Légende \n", Some("Photo : X"), Some("https://a")),
            "Légende\n\nPhoto : X"
        );
        assert_eq!(generate_caption(Network::Instagram, "Légende", None, None), "Légende");
    }

    #[test]
    fn whatsapp_layout() {
        assert_eq!(
            generate_caption(Network::WhatsApp, "Texte", None, Some("https://a/b")),
            "📰 Nouvel article !\n\n_Texte_\n\n💡 À lire sur notre site : https://a/b"
        );
        assert_eq!(
            generate_caption(Network::WhatsApp, "Texte", None, None),
            "📰 Nouvel article !\n\n_Texte_"
        );
    }

    #[test]
    fn bluesky_optional_link() {
        assert_eq!(
            generate_caption(Network::Bluesky, "Texte", Some("credit"), Some("https://a")),
            "Texte\n\n💡 À lire sur notre site : https://a"
        );
        assert_eq!(generate_caption(Network::Bluesky, "Texte", None, Some("")), "Texte");
    }

    #[test]
    fn parses_network_names() {
        assert_eq!("WhatsApp".parse::<Network>().unwrap(), Network::WhatsApp);
        assert_eq!("mastodon".parse::<Network>().unwrap(), Network::Bluesky);
        assert!("myspace".parse::<Network>().is_err());
    }
}
