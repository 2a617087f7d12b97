use serde::{Deserialize, Serialize};

/// Status byte carried in eval, install and debug begin/end replies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
#[repr(u8)]
pub enum ReplyCode {
    Ok = 0,
    SyntaxError = 1,
    EvalError = 2,
    ResourceError = 3,
    NeedReset = 4,
    InternalError = 5,
    DebugStarted = 6,
    DebugStopped = 7,
}

impl From<ReplyCode> for u8 {
    fn from(code: ReplyCode) -> u8 {
        code as u8
    }
}

impl TryFrom<u8> for ReplyCode {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Ok(match value {
            0 => ReplyCode::Ok,
            1 => ReplyCode::SyntaxError,
            2 => ReplyCode::EvalError,
            3 => ReplyCode::ResourceError,
            4 => ReplyCode::NeedReset,
            5 => ReplyCode::InternalError,
            6 => ReplyCode::DebugStarted,
            7 => ReplyCode::DebugStopped,
            other => return Err(format!("unknown reply code {other}")),
        })
    }
}

/// Generic status used for error replies that carry no console reply code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BusStatus {
    Failure,
    Resources,
    Busy,
    Unexpected,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyValue {
    Text(String),
    Uint32(u32),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplyBody {
    Empty,
    Status(ReplyCode),
    StatusText(ReplyCode, String),
    Property(PropertyValue),
    /// Length-prefixed script image, as returned by getScript.
    Script(Vec<u8>),
    /// Response bytes produced by the engine's debugger.
    Debug(Vec<u8>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputKind {
    Print,
    Alert,
}

impl OutputKind {
    pub fn label(self) -> &'static str {
        match self {
            OutputKind::Print => "PRINT",
            OutputKind::Alert => "ALERT",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_reply_code_serializes_as_status_byte() {
        assert_eq!(serde_json::to_value(ReplyCode::NeedReset).unwrap(), json!(4));
        let code: ReplyCode = serde_json::from_value(json!(7)).unwrap();
        assert_eq!(code, ReplyCode::DebugStopped);
    }

    #[test]
    fn test_reply_code_rejects_unknown_byte() {
        assert!(ReplyCode::try_from(8).is_err());
        assert!(serde_json::from_value::<ReplyCode>(json!(200)).is_err());
    }

    #[test]
    fn test_status_text_reply_json_shape() {
        let body = ReplyBody::StatusText(ReplyCode::Ok, "2".into());
        assert_eq!(
            serde_json::to_value(&body).unwrap(),
            json!({ "status_text": [0, "2"] })
        );
    }

    #[test]
    fn test_property_value_untagged() {
        assert_eq!(
            serde_json::to_value(PropertyValue::Uint32(1024)).unwrap(),
            json!(1024)
        );
        assert_eq!(
            serde_json::to_value(PropertyValue::Text("JavaScript".into())).unwrap(),
            json!("JavaScript")
        );
    }
}
