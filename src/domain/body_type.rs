use std::fmt;
use std::str::FromStr;

/// How `Message::body` should be interpreted when building the MIME part.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BodyType {
    Plain,
    Html,
    Markdown,
}

impl BodyType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Plain => "plain",
            Self::Html => "html",
            Self::Markdown => "markdown",
        }
    }
}

impl fmt::Display for BodyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

#[derive(Debug, thiserror::Error)]
#[error("body_type must be plain, html, or markdown (got {0:?})")]
pub struct ParseBodyTypeError(String);

impl FromStr for BodyType {
    type Err = ParseBodyTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "plain" => Ok(Self::Plain),
            "html" => Ok(Self::Html),
            "markdown" => Ok(Self::Markdown),
            other => Err(ParseBodyTypeError(other.to_string())),
        }
    }
}
