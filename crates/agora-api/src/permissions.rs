use uuid::Uuid;

use crate::error::ApiError;

/// The single gate in front of every owner-only mutation: profile edits,
/// post edits and deletes, comment deletes.
pub fn ensure_owner(actor: Uuid, owner: Uuid, what: &str) -> Result<(), ApiError> {
    if actor == owner {
        Ok(())
    } else {
        Err(ApiError::Forbidden(format!("You can only modify your own {what}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_the_owner_passes() {
        let owner = Uuid::new_v4();
        assert!(ensure_owner(owner, owner, "post").is_ok());

        let err = ensure_owner(Uuid::new_v4(), owner, "post").unwrap_err();
        assert_eq!(err.to_string(), "You can only modify your own post");
    }
}
