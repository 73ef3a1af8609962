//! Wire types for the Resource Manager and token endpoints.

use serde::Deserialize;

use crate::backend::{InstanceStatus, InstanceView};

#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub(super) struct InstanceViewBody {
    #[serde(default)]
    pub(super) statuses: Vec<StatusBody>,
}

#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub(super) struct StatusBody {
    pub(super) code: Option<String>,
    pub(super) level: Option<String>,
    pub(super) display_status: Option<String>,
}

impl From<InstanceViewBody> for InstanceView {
    fn from(value: InstanceViewBody) -> Self {
        Self {
            statuses: value
                .statuses
                .into_iter()
                .map(|status| InstanceStatus {
                    code: status.code,
                    level: status.level,
                    display_status: status.display_status,
                })
                .collect(),
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq)]
pub(super) struct JobExecutionBody {
    pub(super) name: Option<String>,
}

#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
pub(super) struct ArmErrorEnvelope {
    pub(super) error: ArmErrorBody,
}

#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
pub(super) struct ArmErrorBody {
    pub(super) code: Option<String>,
    pub(super) message: Option<String>,
}

/// Token endpoints disagree on whether expiry fields are numbers or strings.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
#[serde(untagged)]
pub(super) enum Seconds {
    Number(u64),
    Text(String),
}

impl Seconds {
    pub(super) fn value(&self) -> Option<u64> {
        match self {
            Self::Number(value) => Some(*value),
            Self::Text(text) => text.trim().parse().ok(),
        }
    }
}

#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
pub(super) struct TokenResponse {
    pub(super) access_token: String,
    #[serde(default)]
    pub(super) expires_in: Option<Seconds>,
    #[serde(default)]
    pub(super) expires_on: Option<Seconds>,
}
