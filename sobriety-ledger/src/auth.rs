//! Role checks applied by the request façade
//!
//! | Command | Allowed |
//! |---|---|
//! | addMilestone, addReward | admin |
//! | mintTokens | admin, validator |
//! | checkAndRewardMilestones(u), listTransactions(u) | admin, validator, u |
//! | transferTokens(from, ..) | admin, from |
//! | redeemReward(u, ..) | admin, u |
//! | addUser | anyone while no users exist, then admin |
//! | reads | any registered caller |

use crate::{
    api::Command,
    types::{EntityId, Role, User},
    Error, Result,
};

const ADMIN: &[Role] = &[Role::Admin];
const STAFF: &[Role] = &[Role::Admin, Role::Validator];

/// What a command demands of its caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Requirement {
    /// Any registered user
    Registered,
    /// Caller holds one of the roles
    AnyRole(&'static [Role]),
    /// Caller is `subject` or holds one of the roles
    SubjectOrRole {
        /// User the command acts on, as supplied
        subject: String,
        /// Roles that may act on anyone's behalf
        roles: &'static [Role],
    },
    /// Open while the ledger has no users, then admin only
    Bootstrap,
}

/// Outcome of a successful role check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Run the command as usual
    Granted,
    /// Anonymous first user: the ledger must confirm it holds no users in
    /// the same critical section as the insert
    FirstUserOnly,
}

/// Requirement for a command
pub fn requirement(command: &Command) -> Requirement {
    match command {
        Command::AddUser(_) => Requirement::Bootstrap,
        Command::AddMilestone(_) | Command::AddReward(_) => Requirement::AnyRole(ADMIN),
        Command::MintTokens { .. } => Requirement::AnyRole(STAFF),
        Command::CheckAndRewardMilestones { user_id } | Command::ListTransactions { user_id } => {
            Requirement::SubjectOrRole {
                subject: user_id.clone(),
                roles: STAFF,
            }
        }
        Command::TransferTokens { from_user_id, .. } => Requirement::SubjectOrRole {
            subject: from_user_id.clone(),
            roles: ADMIN,
        },
        Command::RedeemReward { user_id, .. } => Requirement::SubjectOrRole {
            subject: user_id.clone(),
            roles: ADMIN,
        },
        Command::GetUser { .. }
        | Command::ListUsers
        | Command::GetMilestone { .. }
        | Command::ListMilestones
        | Command::GetReward { .. }
        | Command::ListRewards
        | Command::GetTransaction { .. } => Requirement::Registered,
    }
}

/// Check `caller` against `requirement`
pub fn authorize(requirement: &Requirement, caller: Option<&User>) -> Result<Admission> {
    if *requirement == Requirement::Bootstrap && caller.is_none() {
        return Ok(Admission::FirstUserOnly);
    }

    let caller = caller.ok_or_else(|| Error::Unauthorized("caller is required".to_string()))?;
    let allowed = match requirement {
        Requirement::Registered => true,
        Requirement::AnyRole(roles) => has_any(caller, roles),
        Requirement::SubjectOrRole { subject, roles } => {
            is_subject(caller, subject) || has_any(caller, roles)
        }
        Requirement::Bootstrap => caller.has_role(Role::Admin),
    };

    if allowed {
        Ok(Admission::Granted)
    } else {
        Err(Error::Unauthorized(format!(
            "user {} lacks permission for this command",
            caller.id
        )))
    }
}

fn has_any(caller: &User, roles: &[Role]) -> bool {
    roles.iter().any(|role| caller.has_role(*role))
}

fn is_subject(caller: &User, subject: &str) -> bool {
    EntityId::parse(subject).map_or(false, |id| id == caller.id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn user_with(roles: &[Role]) -> User {
        User {
            id: EntityId::from_uuid(Uuid::new_v4()),
            name: "caller".into(),
            sobriety_date: 0,
            tokens: 0,
            claimed_milestones: vec![],
            roles: roles.iter().copied().collect(),
        }
    }

    #[test]
    fn test_bootstrap_admission() {
        assert_eq!(
            authorize(&Requirement::Bootstrap, None).unwrap(),
            Admission::FirstUserOnly
        );

        let member = user_with(&[Role::User]);
        let admin = user_with(&[Role::Admin]);
        assert!(authorize(&Requirement::Bootstrap, Some(&member)).is_err());
        assert_eq!(
            authorize(&Requirement::Bootstrap, Some(&admin)).unwrap(),
            Admission::Granted
        );
    }

    #[test]
    fn test_mint_requires_staff() {
        let command = Command::MintTokens {
            user_id: Uuid::new_v4().to_string(),
            amount: 5,
        };
        let requirement = requirement(&command);

        let validator = user_with(&[Role::Validator]);
        let member = user_with(&[Role::User]);
        assert!(authorize(&requirement, Some(&validator)).is_ok());

        let err = authorize(&requirement, Some(&member)).unwrap_err();
        assert!(matches!(err, Error::Unauthorized(_)));
    }

    #[test]
    fn test_transfer_only_by_sender_or_admin() {
        let sender = user_with(&[Role::User]);
        let other = user_with(&[Role::Validator]);
        let command = Command::TransferTokens {
            from_user_id: sender.id.to_string().to_uppercase(),
            to_user_id: other.id.to_string(),
            amount: 1,
        };
        let requirement = requirement(&command);

        assert!(authorize(&requirement, Some(&sender)).is_ok());
        assert!(authorize(&requirement, Some(&other)).is_err());
        assert!(authorize(&requirement, Some(&user_with(&[Role::Admin]))).is_ok());
    }

    #[test]
    fn test_reads_need_a_caller() {
        let requirement = requirement(&Command::ListRewards);
        assert!(authorize(&requirement, None).is_err());
        assert!(authorize(&requirement, Some(&user_with(&[Role::User]))).is_ok());
    }
}
