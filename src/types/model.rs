use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A chat-completion model identifier.
///
/// This can be a model the client knows about or any other string the
/// endpoint accepts.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Model {
    /// Known model identifiers.
    Known(KnownModel),

    /// Custom model identifier (anything routed by the endpoint).
    Custom(String),
}

/// Known model identifiers on the default endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KnownModel {
    /// DeepSeek R1 (0528), free tier.
    #[serde(rename = "deepseek/deepseek-r1-0528:free")]
    DeepSeekR1Free,

    /// DeepSeek R1.
    #[serde(rename = "deepseek/deepseek-r1")]
    DeepSeekR1,

    /// DeepSeek V3 chat.
    #[serde(rename = "deepseek/deepseek-chat")]
    DeepSeekChat,
}

impl KnownModel {
    const ALL: [KnownModel; 3] = [
        KnownModel::DeepSeekR1Free,
        KnownModel::DeepSeekR1,
        KnownModel::DeepSeekChat,
    ];

    /// The identifier sent on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            KnownModel::DeepSeekR1Free => "deepseek/deepseek-r1-0528:free",
            KnownModel::DeepSeekR1 => "deepseek/deepseek-r1",
            KnownModel::DeepSeekChat => "deepseek/deepseek-chat",
        }
    }
}

impl Default for Model {
    fn default() -> Self {
        Model::Known(KnownModel::DeepSeekR1Free)
    }
}

impl fmt::Display for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Model::Known(known_model) => write!(f, "{known_model}"),
            Model::Custom(custom) => write!(f, "{custom}"),
        }
    }
}

impl fmt::Display for KnownModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Model {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        Ok(KnownModel::ALL
            .into_iter()
            .find(|known| known.as_str() == s)
            .map(Model::Known)
            .unwrap_or_else(|| Model::Custom(s.to_string())))
    }
}

impl From<KnownModel> for Model {
    fn from(model: KnownModel) -> Self {
        Model::Known(model)
    }
}

impl From<String> for Model {
    fn from(model: String) -> Self {
        model.as_str().into()
    }
}

impl From<&str> for Model {
    fn from(model: &str) -> Self {
        match model.parse() {
            Ok(model) => model,
            Err(never) => match never {},
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_model_serialization() {
        let model = Model::Known(KnownModel::DeepSeekR1Free);
        let json = serde_json::to_string(&model).unwrap();
        assert_eq!(json, r#""deepseek/deepseek-r1-0528:free""#);
    }

    #[test]
    fn model_deserialization() {
        let model: Model = serde_json::from_str(r#""deepseek/deepseek-chat""#).unwrap();
        assert_eq!(model, Model::Known(KnownModel::DeepSeekChat));

        let model: Model = serde_json::from_str(r#""openai/gpt-4o""#).unwrap();
        assert_eq!(model, Model::Custom("openai/gpt-4o".to_string()));
    }

    #[test]
    fn from_str_prefers_known() {
        assert_eq!(
            Model::from("deepseek/deepseek-r1"),
            Model::Known(KnownModel::DeepSeekR1)
        );
        assert_eq!(
            Model::from(" mistral/small ".to_string()),
            Model::Custom("mistral/small".to_string())
        );
    }

    #[test]
    fn display() {
        assert_eq!(Model::default().to_string(), "deepseek/deepseek-r1-0528:free");
        assert_eq!(Model::Custom("x/y".to_string()).to_string(), "x/y");
    }
}
