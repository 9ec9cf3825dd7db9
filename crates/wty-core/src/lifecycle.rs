//! Code lifecycle resolution.
//!
//! Every entry point that shows a code asks [`RouteDecision::resolve`] where
//! the visitor belongs instead of inspecting record fields itself.

use serde::Serialize;

use crate::error::{Error, Result};
use crate::model::CodeRecord;

/// Next step for a visitor holding a code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "route", rename_all = "snake_case")]
pub enum RouteDecision {
    /// Not activated and no shop session: a shop has to log in first.
    NeedsShopAuthentication { serial: String },
    /// Not activated and a shop session is held: collect customer details.
    NeedsActivationDetails { serial: String },
    /// Activated: show coverage.
    ShowWarrantyInfo { serial: String },
    /// The backend does not know this serial. Terminal.
    NotFound { message: String },
}

impl RouteDecision {
    pub fn resolve(record: &CodeRecord, shop_session_held: bool) -> Self {
        let serial = record.code.serial_number.clone();
        if record.code.is_activated {
            Self::ShowWarrantyInfo { serial }
        } else if shop_session_held {
            Self::NeedsActivationDetails { serial }
        } else {
            Self::NeedsShopAuthentication { serial }
        }
    }

    /// Folds a lookup outcome into a decision. Missing codes become
    /// [`RouteDecision::NotFound`]; every other failure is handed back so the
    /// caller can keep the view unresolved and retry.
    pub fn from_lookup(lookup: Result<CodeRecord>, shop_session_held: bool) -> Result<Self> {
        match lookup {
            Ok(record) => Ok(Self::resolve(&record, shop_session_held)),
            Err(Error::NotFound(message)) => Ok(Self::NotFound { message }),
            Err(e) => Err(e),
        }
    }

    pub fn path(&self) -> Option<String> {
        match self {
            Self::NeedsShopAuthentication { serial } => Some(format!("/shop/login/{serial}")),
            Self::NeedsActivationDetails { serial } => Some(format!("/activate/{serial}")),
            Self::ShowWarrantyInfo { serial } => Some(format!("/warranty/{serial}")),
            Self::NotFound { .. } => None,
        }
    }
}

/// State of a code view; starts unresolved until the lookup lands.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Resolution {
    #[default]
    Unresolved,
    Resolved(RouteDecision),
}

impl Resolution {
    pub fn decision(&self) -> Option<&RouteDecision> {
        match self {
            Self::Unresolved => None,
            Self::Resolved(decision) => Some(decision),
        }
    }
}
