//! Payload validation and identifier parsing
//!
//! Validation runs every rule and reports all violations in a single
//! `InvalidPayload` error so a caller sees every problem at once.

use crate::{
    types::{EntityId, MilestonePayload, RewardPayload, Role, UserPayload},
    Error, Result,
};
use std::collections::BTreeSet;

/// Accumulates rule violations for one payload
#[derive(Debug, Default)]
pub struct Violations {
    errors: Vec<String>,
}

impl Violations {
    /// Empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `message` when `violated` holds
    pub fn check(&mut self, violated: bool, message: impl FnOnce() -> String) {
        if violated {
            self.errors.push(message());
        }
    }

    /// Record a violation unconditionally
    pub fn push(&mut self, message: String) {
        self.errors.push(message);
    }

    /// Number of violations
    pub fn len(&self) -> usize {
        self.errors.len()
    }

    /// True when no rule was violated
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// `Ok` when empty, otherwise one `InvalidPayload` listing every violation
    pub fn finish(self) -> Result<()> {
        if self.errors.is_empty() {
            return Ok(());
        }
        Err(Error::InvalidPayload(format!(
            "Invalid payload. Errors=[{}]",
            self.errors.join(", ")
        )))
    }
}

/// Empty after trimming
pub fn is_blank(s: &str) -> bool {
    s.trim().is_empty()
}

/// Parse an identifier argument, naming the field in the error
pub fn parse_id(field: &str, raw: &str) -> Result<EntityId> {
    EntityId::parse(raw).ok_or_else(|| {
        Error::InvalidPayload(format!(
            "{}=\"{}\" is not in the valid uuid format.",
            field, raw
        ))
    })
}

/// Validate a user payload, returning the trimmed name and parsed roles
pub fn validate_user(payload: &UserPayload) -> Result<(String, BTreeSet<Role>)> {
    let mut violations = Violations::new();
    violations.check(is_blank(&payload.name), || {
        format!("name='{}' cannot be empty.", payload.name)
    });

    let mut roles = BTreeSet::new();
    for tag in &payload.roles {
        match tag.parse::<Role>() {
            Ok(role) => {
                roles.insert(role);
            }
            Err(message) => violations.push(message),
        }
    }
    violations.finish()?;

    if roles.is_empty() {
        roles.insert(Role::User);
    }
    Ok((payload.name.trim().to_string(), roles))
}

/// Validate a milestone payload
pub fn validate_milestone(payload: &MilestonePayload) -> Result<()> {
    let mut violations = Violations::new();
    violations.check(is_blank(&payload.description), || {
        format!("description='{}' cannot be empty.", payload.description)
    });
    violations.check(payload.token_reward == 0, || {
        format!("tokenReward='{}' cannot be set to zero.", payload.token_reward)
    });
    violations.check(payload.duration_in_days == 0, || {
        format!(
            "durationInDays='{}' cannot be set to zero.",
            payload.duration_in_days
        )
    });
    violations.finish()
}

/// Validate a reward payload
pub fn validate_reward(payload: &RewardPayload) -> Result<()> {
    let mut violations = Violations::new();
    violations.check(is_blank(&payload.description), || {
        format!("description='{}' cannot be empty.", payload.description)
    });
    violations.check(payload.availability == 0, || {
        format!(
            "availability='{}' cannot be set to zero.",
            payload.availability
        )
    });
    violations.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_milestone_reports_every_violation() {
        let payload = MilestonePayload {
            duration_in_days: 0,
            token_reward: 0,
            description: "   ".into(),
        };
        let err = validate_milestone(&payload).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("description"));
        assert!(message.contains("tokenReward"));
        assert!(message.contains("durationInDays"));
    }

    #[test]
    fn test_valid_milestone() {
        let payload = MilestonePayload {
            duration_in_days: 30,
            token_reward: 100,
            description: "30 days".into(),
        };
        assert!(validate_milestone(&payload).is_ok());
    }

    #[test]
    fn test_user_roles_default_and_unknown() {
        let (name, roles) = validate_user(&UserPayload {
            name: "  Alex ".into(),
            roles: vec![],
        })
        .unwrap();
        assert_eq!(name, "Alex");
        assert!(roles.contains(&Role::User));

        let err = validate_user(&UserPayload {
            name: "".into(),
            roles: vec!["wizard".into()],
        })
        .unwrap_err();
        let message = err.to_string();
        assert!(message.contains("name"));
        assert!(message.contains("wizard"));
    }

    #[test]
    fn test_reward_zero_availability_rejected() {
        let err = validate_reward(&RewardPayload {
            token_cost: 10,
            description: "Coffee".into(),
            availability: 0,
        })
        .unwrap_err();
        assert!(err.to_string().contains("availability"));
    }

    #[test]
    fn test_parse_id_names_field() {
        let err = parse_id("userId", "abc").unwrap_err();
        assert_eq!(
            err.to_string(),
            "userId=\"abc\" is not in the valid uuid format."
        );
    }

    #[test]
    fn test_violations_count() {
        let mut violations = Violations::new();
        violations.check(true, || "a".into());
        violations.check(false, || "b".into());
        violations.check(true, || "c".into());
        assert_eq!(violations.len(), 2);
        assert_eq!(
            violations.finish().unwrap_err().to_string(),
            "Invalid payload. Errors=[a, c]"
        );
    }
}
