//! Stage 1: the document must parse as YAML.

use autogen_core::{ValidationFinding, ValidationStage};
use serde_yaml::Value;

/// Parse document text. Every failure is a single blocking finding.
pub fn parse_document(text: &str) -> Result<Value, ValidationFinding> {
    if text.trim().is_empty() {
        return Err(ValidationFinding::blocking(
            ValidationStage::Syntax,
            "",
            "document is empty",
        ));
    }

    match serde_yaml::from_str::<Value>(text) {
        Ok(Value::Null) => Err(ValidationFinding::blocking(
            ValidationStage::Syntax,
            "",
            "document contains no YAML content",
        )),
        Ok(doc) => Ok(doc),
        Err(e) => {
            let location = e
                .location()
                .map(|loc| format!("line {}", loc.line()))
                .unwrap_or_default();
            Err(ValidationFinding::blocking(
                ValidationStage::Syntax,
                location,
                format!("invalid YAML: {e}"),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_yaml_parses() {
        let doc = parse_document("alias: Porch\ntrigger: []\n").expect("valid");
        assert!(doc.is_mapping());
    }

    #[test]
    fn test_empty_and_comment_only_documents_block() {
        let empty = parse_document("  \n").expect_err("empty");
        assert!(empty.is_blocking());
        assert_eq!(empty.message, "document is empty");

        let comments = parse_document("# nothing here\n").expect_err("null");
        assert_eq!(comments.message, "document contains no YAML content");
    }

    #[test]
    fn test_error_carries_line() {
        let err = parse_document("alias: Porch\naction:\n  - service: light.turn_on\n   bad: [\n")
            .expect_err("invalid");
        assert_eq!(err.stage, ValidationStage::Syntax);
        assert!(err.location.starts_with("line "));
        assert!(err.message.starts_with("invalid YAML"));
    }
}
