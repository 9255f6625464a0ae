use log::info;
use thiserror::Error;

use crate::{DatabaseError, LiveContext, PrimaryKey, UpdatedUser, UserData};

pub const MAX_BIO_LENGTH: usize = 160;

/// Public profiles and the follow graph between users.
pub struct Social {
    context: LiveContext,
}

/// An allow-listed profile patch. At least one field must be present.
#[derive(Debug, Default)]
pub struct ProfileUpdate {
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
    pub bio: Option<String>,
}

#[derive(Debug)]
pub struct FollowToggle {
    /// Whether the requester is now following the target
    pub following: bool,
}

#[derive(Debug, Error)]
pub enum SocialError {
    #[error("{0}")]
    Validation(&'static str),
    #[error("user:id doesn't exist")]
    NotFound,
    #[error(transparent)]
    Db(DatabaseError),
}

impl Social {
    pub fn new(context: &LiveContext) -> Self {
        Self {
            context: context.clone(),
        }
    }

    /// Looks up a public profile. Anyone can view, no auth required.
    pub async fn profile_by_username(&self, username: &str) -> Result<UserData, SocialError> {
        self.context
            .database
            .user_by_username(username)
            .await
            .map_err(not_found)
    }

    /// Applies a profile patch for the user themselves.
    pub async fn update_profile(
        &self,
        user_id: PrimaryKey,
        update: ProfileUpdate,
    ) -> Result<UserData, SocialError> {
        if update.display_name.is_none() && update.avatar_url.is_none() && update.bio.is_none() {
            return Err(SocialError::Validation("No valid fields to update"));
        }

        if update.bio.as_ref().is_some_and(|b| b.chars().count() > MAX_BIO_LENGTH) {
            return Err(SocialError::Validation(
                "Bio must be at most 160 characters",
            ));
        }

        self.context
            .database
            .update_user(UpdatedUser {
                id: user_id,
                display_name: update.display_name,
                avatar_url: update.avatar_url,
                bio: update.bio,
                is_streamer: None,
            })
            .await
            .map_err(not_found)
    }

    /// Follows the target, or unfollows when already following.
    pub async fn toggle_follow(
        &self,
        follower_id: PrimaryKey,
        target_id: PrimaryKey,
    ) -> Result<FollowToggle, SocialError> {
        if follower_id == target_id {
            return Err(SocialError::Validation("You cannot follow yourself"));
        }

        let following = self
            .context
            .database
            .toggle_follow(follower_id, target_id)
            .await
            .map_err(not_found)?;

        info!(
            "User {follower_id} {} user {target_id}",
            if following { "followed" } else { "unfollowed" }
        );

        Ok(FollowToggle { following })
    }

    pub async fn followers(&self, user_id: PrimaryKey) -> Result<Vec<UserData>, SocialError> {
        self.context
            .database
            .followers_of(user_id)
            .await
            .map_err(not_found)
    }

    pub async fn following(&self, user_id: PrimaryKey) -> Result<Vec<UserData>, SocialError> {
        self.context
            .database
            .following_of(user_id)
            .await
            .map_err(not_found)
    }
}

fn not_found(error: DatabaseError) -> SocialError {
    match error {
        DatabaseError::NotFound { .. } => SocialError::NotFound,
        e => SocialError::Db(e),
    }
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use super::*;
    use crate::{Live, MemoryDatabase, NewAccount};
    use codecast_core::{ProviderConfig, SequenceUidGenerator, TokenIssuer};

    fn live() -> Live {
        let config = ProviderConfig::new("app".to_string(), "secret".to_string())
            .expect("config is valid");

        Live::new(
            Arc::new(MemoryDatabase::new()),
            TokenIssuer::new(config),
            Arc::new(SequenceUidGenerator::default()),
        )
    }

    async fn register(live: &Live, username: &str) -> crate::UserData {
        live.auth
            .register(NewAccount {
                username: username.to_string(),
                email: format!("{username}@codecast.dev"),
                password: "hunter2hunter2".to_string(),
                display_name: username.to_string(),
            })
            .await
            .expect("registration succeeds")
    }

    #[tokio::test]
    async fn test_follow_toggles_and_counts() {
        let live = live();
        let amara = register(&live, "amara").await;
        let niko = register(&live, "niko").await;

        let first = live
            .social
            .toggle_follow(amara.id, niko.id)
            .await
            .expect("follow succeeds");

        assert!(first.following);

        let niko_profile = live
            .social
            .profile_by_username("niko")
            .await
            .expect("profile resolves");

        assert_eq!(niko_profile.follower_count, 1);

        let followers = live.social.followers(niko.id).await.expect("list resolves");
        assert_eq!(followers.len(), 1);
        assert_eq!(followers[0].id, amara.id);

        let following = live.social.following(amara.id).await.expect("list resolves");
        assert_eq!(following.len(), 1);

        // The same call again unfollows
        let second = live
            .social
            .toggle_follow(amara.id, niko.id)
            .await
            .expect("unfollow succeeds");

        assert!(!second.following);

        let niko_profile = live.social.profile_by_username("niko").await.unwrap();
        assert_eq!(niko_profile.follower_count, 0);
        assert!(live.social.followers(niko.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_self_follow_is_rejected() {
        let live = live();
        let amara = register(&live, "amara").await;

        let result = live.social.toggle_follow(amara.id, amara.id).await;

        assert!(matches!(result, Err(SocialError::Validation(_))));
    }

    #[tokio::test]
    async fn test_profile_updates_are_allow_listed() {
        let live = live();
        let amara = register(&live, "amara").await;

        let empty = live.social.update_profile(amara.id, Default::default()).await;
        assert!(matches!(empty, Err(SocialError::Validation(_))));

        let oversized = live
            .social
            .update_profile(
                amara.id,
                ProfileUpdate {
                    bio: Some("x".repeat(MAX_BIO_LENGTH + 1)),
                    ..Default::default()
                },
            )
            .await;

        assert!(matches!(oversized, Err(SocialError::Validation(_))));

        let updated = live
            .social
            .update_profile(
                amara.id,
                ProfileUpdate {
                    bio: Some("streams rust".to_string()),
                    avatar_url: Some("https://cdn.codecast.dev/amara.png".to_string()),
                    ..Default::default()
                },
            )
            .await
            .expect("update succeeds");

        assert_eq!(updated.bio, "streams rust");
        assert!(updated.avatar_url.is_some());
        // Untouched fields stay put
        assert_eq!(updated.display_name, "amara");
    }
}
