//! Tool schemas advertised to the model and the matching tool names.

use serde_json::json;

use crate::core::realtime::ToolDef;

pub const RECORD_CALL_DATA: &str = "record_call_data";
pub const CHECK_STATUS: &str = "check_status";
pub const TRANSFER_TO_HUMAN: &str = "transfer_to_human";
pub const END_CALL: &str = "end_call";

/// Tools the dispatcher knows how to execute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tool {
    RecordCallData,
    CheckStatus,
    TransferToHuman,
    EndCall,
}

impl Tool {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            RECORD_CALL_DATA => Some(Self::RecordCallData),
            CHECK_STATUS => Some(Self::CheckStatus),
            TRANSFER_TO_HUMAN => Some(Self::TransferToHuman),
            END_CALL => Some(Self::EndCall),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::RecordCallData => RECORD_CALL_DATA,
            Self::CheckStatus => CHECK_STATUS,
            Self::TransferToHuman => TRANSFER_TO_HUMAN,
            Self::EndCall => END_CALL,
        }
    }
}

fn function(name: &str, description: &str, parameters: serde_json::Value) -> ToolDef {
    ToolDef {
        tool_type: "function".to_string(),
        name: name.to_string(),
        description: Some(description.to_string()),
        parameters: Some(parameters),
    }
}

/// The full tool set sent in the session configuration.
///
/// `record_call_data` takes no phone parameter. The caller's number comes
/// from the call origination, never from the model.
pub fn tool_definitions() -> Vec<ToolDef> {
    vec![
        function(
            RECORD_CALL_DATA,
            "Record call information to the database",
            json!({
                "type": "object",
                "properties": {
                    "task_type": {
                        "type": "string",
                        "description": "Type of task or request (e.g., 'Policy Question', 'Address Change', 'Payment Inquiry')"
                    },
                    "call_summary": {
                        "type": "string",
                        "description": "Brief summary of the call"
                    },
                    "detail_info": {
                        "type": "string",
                        "description": "Detailed information about the call, customer requests, and outcomes"
                    }
                },
                "required": ["task_type", "call_summary"]
            }),
        ),
        function(
            CHECK_STATUS,
            "Check availability status of team members' phone lines",
            json!({
                "type": "object",
                "properties": {
                    "line_numbers": {
                        "type": "array",
                        "items": {"type": "integer"},
                        "description": "Array of line numbers to check (1, 2, 3)"
                    }
                },
                "required": ["line_numbers"]
            }),
        ),
        function(
            TRANSFER_TO_HUMAN,
            "Transfer the active call to a live human agent",
            json!({
                "type": "object",
                "properties": {
                    "line_number": {
                        "type": "integer",
                        "description": "Preferred: 1, 2, or 3. The server maps this to the correct phone number.",
                        "enum": [1, 2, 3]
                    },
                    "target_number": {
                        "type": "string",
                        "description": "Optional: E.164 phone number to transfer to (used if line_number is not provided)."
                    },
                    "reason": {
                        "type": "string",
                        "description": "Short reason for the transfer (for logging)"
                    }
                }
            }),
        ),
        function(
            END_CALL,
            "End the phone call",
            json!({
                "type": "object",
                "properties": {
                    "reason": {
                        "type": "string",
                        "description": "Reason for ending the call"
                    }
                },
                "required": ["reason"]
            }),
        ),
    ]
}
