use anyhow::Result;
use serde::Serialize;
use tracing::info;

use crate::{contact::Contact, model::user::PasswordlessUser, store::UserContactUpdate};

use super::PasswordlessEngine;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignInUp {
    pub user: PasswordlessUser,
    pub created_new_user: bool,
}

#[derive(Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "status")]
pub enum UpdateUser {
    #[serde(rename = "OK")]
    Ok,
    #[serde(rename = "UNKNOWN_USER_ID_ERROR")]
    UnknownUserId,
    #[serde(rename = "EMAIL_ALREADY_EXISTS_ERROR")]
    EmailAlreadyExists,
    #[serde(rename = "PHONE_NUMBER_ALREADY_EXISTS_ERROR")]
    PhoneNumberAlreadyExists,
}

impl PasswordlessEngine {
    /// Sign-in-or-sign-up by contact method. Idempotent on identity: the
    /// store's find-or-create is atomic, so concurrent calls for the same
    /// never-seen contact resolve to one user.
    pub async fn sign_in_up(&self, tenant: &str, contact: &Contact) -> Result<SignInUp> {
        let (user, created_new_user) = self.store().sign_in_up_user(tenant, contact).await?;
        if created_new_user {
            info!(tenant, user_id = %user.user_id, "created passwordless user");
        }
        Ok(SignInUp {
            user,
            created_new_user,
        })
    }

    /// Change a user's contact methods. New values are normalized and
    /// validated first; the uniqueness check and the write happen as one
    /// atomic store step, and a conflict performs no mutation.
    pub async fn update_user(
        &self,
        user_id: &str,
        new_email: Option<&str>,
        new_phone: Option<&str>,
    ) -> Result<UpdateUser> {
        let email = new_email.map(Contact::parse_email).transpose()?;
        let phone = new_phone.map(Contact::parse_phone).transpose()?;

        let outcome = self
            .store()
            .update_user_contact(
                user_id,
                email.as_ref().map(|c| c.value()),
                phone.as_ref().map(|c| c.value()),
            )
            .await?;
        Ok(match outcome {
            UserContactUpdate::Ok => UpdateUser::Ok,
            UserContactUpdate::UnknownUser => UpdateUser::UnknownUserId,
            UserContactUpdate::EmailTaken => UpdateUser::EmailAlreadyExists,
            UserContactUpdate::PhoneNumberTaken => UpdateUser::PhoneNumberAlreadyExists,
        })
    }

    /// Absence is a valid negative result, not an error.
    pub async fn get_user_by_id(&self, user_id: &str) -> Result<Option<PasswordlessUser>> {
        self.store().get_user(user_id).await
    }

    pub async fn get_user_by_email(
        &self,
        tenant: &str,
        email: &str,
    ) -> Result<Option<PasswordlessUser>> {
        let contact = Contact::parse_email(email)?;
        self.store().find_user_by_contact(tenant, &contact).await
    }

    pub async fn get_user_by_phone_number(
        &self,
        tenant: &str,
        phone: &str,
    ) -> Result<Option<PasswordlessUser>> {
        let contact = Contact::parse_phone(phone)?;
        self.store().find_user_by_contact(tenant, &contact).await
    }
}

#[cfg(test)]
mod tests {
    use crate::{contact::Contact, engine::testutil::engine};

    use super::UpdateUser;

    #[tokio::test]
    async fn sign_in_up_is_idempotent_on_identity() {
        let engine = engine();
        let contact = Contact::parse_email("a@x.com").unwrap();

        let first = engine.sign_in_up("public", &contact).await.unwrap();
        assert!(first.created_new_user);

        let second = engine.sign_in_up("public", &contact).await.unwrap();
        assert!(!second.created_new_user);
        assert_eq!(first.user.user_id, second.user.user_id);
    }

    #[tokio::test]
    async fn lookups_return_absence_not_errors() {
        let engine = engine();
        assert!(engine.get_user_by_id("nope").await.unwrap().is_none());
        assert!(engine
            .get_user_by_email("public", "ghost@x.com")
            .await
            .unwrap()
            .is_none());
        assert!(engine
            .get_user_by_phone_number("public", "+442079460958")
            .await
            .unwrap()
            .is_none());

        let contact = Contact::parse_phone("+442079460958").unwrap();
        let created = engine.sign_in_up("public", &contact).await.unwrap();
        let found = engine
            .get_user_by_phone_number("public", "+44 20 7946 0958")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.user_id, created.user.user_id);
        assert!(found.email.is_none());
    }

    #[tokio::test]
    async fn update_to_foreign_contact_fails_without_mutation() {
        let engine = engine();
        let alice = engine
            .sign_in_up("public", &Contact::parse_email("a@x.com").unwrap())
            .await
            .unwrap()
            .user;
        let bob = engine
            .sign_in_up("public", &Contact::parse_email("b@x.com").unwrap())
            .await
            .unwrap()
            .user;

        let res = engine
            .update_user(&bob.user_id, Some("a@x.com"), None)
            .await
            .unwrap();
        assert_eq!(res, UpdateUser::EmailAlreadyExists);
        let bob_after = engine.get_user_by_id(&bob.user_id).await.unwrap().unwrap();
        assert_eq!(bob_after.email.as_deref(), Some("b@x.com"));

        // Updating to one's own current value is a no-op success.
        let res = engine
            .update_user(&alice.user_id, Some("a@x.com"), None)
            .await
            .unwrap();
        assert_eq!(res, UpdateUser::Ok);

        let res = engine
            .update_user("missing-user", Some("c@x.com"), None)
            .await
            .unwrap();
        assert_eq!(res, UpdateUser::UnknownUserId);
    }

    #[tokio::test]
    async fn user_may_hold_both_email_and_phone() {
        let engine = engine();
        let alice = engine
            .sign_in_up("public", &Contact::parse_email("a@x.com").unwrap())
            .await
            .unwrap()
            .user;

        let res = engine
            .update_user(&alice.user_id, None, Some("+442079460958"))
            .await
            .unwrap();
        assert_eq!(res, UpdateUser::Ok);

        let by_phone = engine
            .get_user_by_phone_number("public", "+442079460958")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(by_phone.user_id, alice.user_id);
        assert_eq!(by_phone.email.as_deref(), Some("a@x.com"));

        // Phone uniqueness now guards Alice's number too.
        let bob = engine
            .sign_in_up("public", &Contact::parse_email("b@x.com").unwrap())
            .await
            .unwrap()
            .user;
        let res = engine
            .update_user(&bob.user_id, None, Some("+442079460958"))
            .await
            .unwrap();
        assert_eq!(res, UpdateUser::PhoneNumberAlreadyExists);
    }

    #[tokio::test]
    async fn new_contact_values_are_normalized_before_the_guard() {
        let engine = engine();
        let alice = engine
            .sign_in_up("public", &Contact::parse_email("a@x.com").unwrap())
            .await
            .unwrap()
            .user;

        let res = engine
            .update_user(&alice.user_id, Some("  A@X.COM "), None)
            .await
            .unwrap();
        assert_eq!(res, UpdateUser::Ok);
        let after = engine.get_user_by_id(&alice.user_id).await.unwrap().unwrap();
        assert_eq!(after.email.as_deref(), Some("a@x.com"));

        assert!(engine
            .update_user(&alice.user_id, Some("not-an-email"), None)
            .await
            .is_err());
    }
}
