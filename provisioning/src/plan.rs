//! Plan tiers and their signup allocations

use credit_ledger::{PlanStatus, UNLIMITED_BALANCE};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Subscription plan a tenant signs up on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlanTier {
    /// Free tier
    Free,
    /// Starter tier
    Starter,
    /// Professional tier
    Professional,
    /// Enterprise tier
    Enterprise,
    /// Time-boxed trial with unlimited credits
    Trial,
}

impl PlanTier {
    /// Signup credit allocation; `UNLIMITED_BALANCE` for trials
    pub fn signup_credits(&self) -> i64 {
        match self {
            PlanTier::Free => 10_000,
            PlanTier::Starter => 25_000,
            PlanTier::Professional => 100_000,
            PlanTier::Enterprise => 500_000,
            PlanTier::Trial => UNLIMITED_BALANCE,
        }
    }

    /// How long the allocation lasts before expiring, in days
    pub fn expiry_days(&self) -> Option<i64> {
        match self {
            PlanTier::Trial => Some(14),
            _ => None,
        }
    }

    /// Feature limits for this plan
    pub fn limits(&self) -> PlanLimits {
        match self {
            PlanTier::Free => PlanLimits {
                max_members: Some(2),
                max_products: Some(50),
            },
            PlanTier::Starter => PlanLimits {
                max_members: Some(5),
                max_products: Some(500),
            },
            PlanTier::Professional => PlanLimits {
                max_members: Some(15),
                max_products: Some(5_000),
            },
            PlanTier::Enterprise => PlanLimits {
                max_members: None,
                max_products: None,
            },
            PlanTier::Trial => PlanLimits {
                max_members: Some(15),
                max_products: Some(5_000),
            },
        }
    }

    /// Ledger tier status for this plan
    pub fn status(&self) -> PlanStatus {
        match self {
            PlanTier::Free | PlanTier::Trial => PlanStatus::Free,
            _ => PlanStatus::Paid,
        }
    }

    /// Stable lowercase name, used in tenant rows and subscription events
    pub fn as_str(&self) -> &'static str {
        match self {
            PlanTier::Free => "free",
            PlanTier::Starter => "starter",
            PlanTier::Professional => "professional",
            PlanTier::Enterprise => "enterprise",
            PlanTier::Trial => "trial",
        }
    }
}

/// Feature ceilings for a plan; `None` means unlimited
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanLimits {
    /// Maximum member seats
    pub max_members: Option<u32>,

    /// Maximum catalog size
    pub max_products: Option<u32>,
}

impl fmt::Display for PlanTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PlanTier {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "free" => Ok(PlanTier::Free),
            "starter" => Ok(PlanTier::Starter),
            "professional" => Ok(PlanTier::Professional),
            "enterprise" => Ok(PlanTier::Enterprise),
            "trial" => Ok(PlanTier::Trial),
            other => Err(crate::Error::UnknownPlan(other.to_string())),
        }
    }
}
