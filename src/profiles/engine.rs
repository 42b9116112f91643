use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    AppError, AppResult, buddies, communities,
    gate::Caller,
    models::{ApprovalStatus, Profile},
};

pub(crate) const COLUMNS: &str = "id, name, specialization, community_slug, phone, linkedin_url, \
    github_url, status, role, must_change_password, created_at, updated_at";

/// The fields a member fills in on sign-up and may change later.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProfileFields {
    pub name: Option<String>,
    pub specialization: Option<String>,
    pub community_slug: Option<String>,
    pub phone: Option<String>,
    pub linkedin_url: Option<String>,
    pub github_url: Option<String>,
}

impl ProfileFields {
    fn tidy(self) -> Self {
        let tidy = |field: Option<String>| {
            field
                .map(|text| text.trim().to_owned())
                .filter(|text| !text.is_empty())
        };
        Self {
            name: tidy(self.name),
            specialization: tidy(self.specialization),
            community_slug: tidy(self.community_slug),
            phone: tidy(self.phone),
            linkedin_url: tidy(self.linkedin_url),
            github_url: tidy(self.github_url),
        }
    }
}

/// What other members see of a profile.
#[derive(Debug, Clone, Serialize)]
pub struct ProfileCard {
    pub id: Uuid,
    pub name: Option<String>,
    pub specialization: Option<String>,
    pub community_slug: Option<String>,
    pub linkedin_url: Option<String>,
    pub github_url: Option<String>,
    pub buddies: i64,
    pub relation: buddies::RelationState,
}

pub async fn get(db_pool: &SqlitePool, user_id: Uuid) -> AppResult<Option<Profile>> {
    let profile = sqlx::query_as(&format!("SELECT {COLUMNS} FROM profiles WHERE id = ?"))
        .bind(user_id)
        .fetch_optional(db_pool)
        .await?;
    Ok(profile)
}

/// Create the caller's own profile. It waits for an admin as PENDING.
///
/// Only an identity is needed here; approval comes later.
pub async fn register(db_pool: &SqlitePool, caller: &Caller, fields: ProfileFields) -> AppResult<Profile> {
    let fields = fields.tidy();
    if fields.name.is_none() {
        return Err(AppError::invalid("a profile needs a name"));
    }
    communities::ensure_known(db_pool, fields.community_slug.as_deref()).await?;

    let now = OffsetDateTime::now_utc();
    let profile: Profile = sqlx::query_as(&format!(
        "INSERT INTO profiles (id, name, specialization, community_slug, phone, linkedin_url, github_url, status, created_at, updated_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
         RETURNING {COLUMNS}"
    ))
    .bind(caller.user_id)
    .bind(fields.name)
    .bind(fields.specialization)
    .bind(fields.community_slug)
    .bind(fields.phone)
    .bind(fields.linkedin_url)
    .bind(fields.github_url)
    .bind(ApprovalStatus::Pending)
    .bind(now)
    .bind(now)
    .fetch_one(db_pool)
    .await
    .map_err(|e| match AppError::from(e) {
        e if e.is_unique_violation() => AppError::conflict("you already have a profile"),
        e => e,
    })?;

    tracing::info!(user = %profile.id, "profile registered");
    Ok(profile)
}

/// Overwrite the caller's own editable fields. Approval status and role are not among them.
pub async fn edit(db_pool: &SqlitePool, caller: &Caller, fields: ProfileFields) -> AppResult<Profile> {
    let fields = fields.tidy();
    if fields.name.is_none() {
        return Err(AppError::invalid("a profile needs a name"));
    }
    communities::ensure_known(db_pool, fields.community_slug.as_deref()).await?;

    let profile = sqlx::query_as(&format!(
        "UPDATE profiles
         SET name = ?, specialization = ?, community_slug = ?, phone = ?, linkedin_url = ?, github_url = ?, updated_at = ?
         WHERE id = ?
         RETURNING {COLUMNS}"
    ))
    .bind(fields.name)
    .bind(fields.specialization)
    .bind(fields.community_slug)
    .bind(fields.phone)
    .bind(fields.linkedin_url)
    .bind(fields.github_url)
    .bind(OffsetDateTime::now_utc())
    .bind(caller.user_id)
    .fetch_optional(db_pool)
    .await?;
    profile.ok_or(AppError::NotFound("profile"))
}

/// The password itself lives with the identity provider; this only drops the reminder.
pub async fn password_changed(db_pool: &SqlitePool, caller: &Caller) -> AppResult<Profile> {
    let profile = sqlx::query_as(&format!(
        "UPDATE profiles SET must_change_password = 0, updated_at = ? WHERE id = ? RETURNING {COLUMNS}"
    ))
    .bind(OffsetDateTime::now_utc())
    .bind(caller.user_id)
    .fetch_optional(db_pool)
    .await?;
    profile.ok_or(AppError::NotFound("profile"))
}

pub async fn card(db_pool: &SqlitePool, caller: &Caller, user_id: Uuid) -> AppResult<ProfileCard> {
    let me = caller.member()?;
    let profile = get(db_pool, user_id)
        .await?
        .ok_or(AppError::NotFound("profile"))?;

    let relation = if me == user_id {
        buddies::RelationState::None
    } else {
        buddies::state(db_pool, caller, user_id).await?
    };

    Ok(ProfileCard {
        id: profile.id,
        name: profile.name,
        specialization: profile.specialization,
        community_slug: profile.community_slug,
        linkedin_url: profile.linkedin_url,
        github_url: profile.github_url,
        buddies: buddies::count_accepted(db_pool, user_id).await?,
        relation,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{db, gate, testing};

    fn named(name: &str) -> ProfileFields {
        ProfileFields {
            name: Some(name.to_owned()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn registration_waits_for_approval() {
        let db_pool = db::temporary().await;
        let caller = testing::caller(&db_pool, Uuid::now_v7()).await;
        assert!(caller.access.has_identity);

        let profile = register(&db_pool, &caller, named("  Ada  ")).await.unwrap();
        assert_eq!(profile.status, ApprovalStatus::Pending);
        assert_eq!(profile.name.as_deref(), Some("Ada"));

        let caller = gate::resolve(&db_pool, caller.user_id).await.unwrap();
        assert!(!caller.access.allowed());

        assert!(matches!(
            register(&db_pool, &caller, named("Ada")).await,
            Err(AppError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn edit_keeps_status_and_clears_blanks() {
        let db_pool = db::temporary().await;
        let member = testing::member(&db_pool).await;

        let fields = ProfileFields {
            name: Some("Grace".to_owned()),
            github_url: Some("   ".to_owned()),
            ..Default::default()
        };
        let profile = edit(&db_pool, &member, fields).await.unwrap();
        assert_eq!(profile.status, ApprovalStatus::Approved);
        assert_eq!(profile.github_url, None);

        assert!(matches!(
            edit(&db_pool, &member, ProfileFields::default()).await,
            Err(AppError::Invalid(_))
        ));
    }

    #[tokio::test]
    async fn password_flag_clears() {
        let db_pool = db::temporary().await;
        let member = testing::member(&db_pool).await;
        sqlx::query("UPDATE profiles SET must_change_password = 1 WHERE id = ?")
            .bind(member.user_id)
            .execute(&db_pool)
            .await
            .unwrap();

        let profile = password_changed(&db_pool, &member).await.unwrap();
        assert!(!profile.must_change_password);
    }

    #[tokio::test]
    async fn card_counts_buddies() {
        let db_pool = db::temporary().await;
        let a = testing::member(&db_pool).await;
        let b = testing::member(&db_pool).await;

        let relation = buddies::send_request(&db_pool, &a, b.user_id).await.unwrap();
        buddies::accept(&db_pool, &b, relation.id).await.unwrap();

        let card = card(&db_pool, &a, b.user_id).await.unwrap();
        assert_eq!(card.buddies, 1);
        assert_eq!(card.relation, buddies::RelationState::Accepted);

        let pending = testing::pending(&db_pool).await;
        assert!(matches!(
            super::card(&db_pool, &pending, b.user_id).await,
            Err(AppError::PendingApproval)
        ));
    }
}
