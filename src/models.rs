use serde::{Deserialize, Serialize};
use sqlx::{FromRow, types::Json};
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "UPPERCASE")]
#[sqlx(rename_all = "UPPERCASE")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Rejected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum Role {
    Admin,
    Coordinator,
    AssistantCoordinator,
    Secretary,
    JointSecretary,
    Member,
}

impl Role {
    pub const HOSTS: [Role; 3] = [Role::Secretary, Role::JointSecretary, Role::Admin];

    pub fn as_str(&self) -> &'static str {
        use Role::*;
        match self {
            Admin => "admin",
            Coordinator => "coordinator",
            AssistantCoordinator => "assistant_coordinator",
            Secretary => "secretary",
            JointSecretary => "joint_secretary",
            Member => "member",
        }
    }

    /// Parses the legacy free-text `profiles.role` field. Unknown text is no role at all.
    pub fn parse_legacy(text: &str) -> Option<Role> {
        use Role::*;
        match text.trim().to_ascii_lowercase().as_str() {
            "admin" => Some(Admin),
            "coordinator" => Some(Coordinator),
            "assistant_coordinator" => Some(AssistantCoordinator),
            "secretary" => Some(Secretary),
            "joint_secretary" => Some(JointSecretary),
            "member" => Some(Member),
            _ => None,
        }
    }

    pub fn can_host(&self) -> bool {
        Self::HOSTS.contains(self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "UPPERCASE")]
#[sqlx(rename_all = "UPPERCASE")]
pub enum BuddyStatus {
    Pending,
    Accepted,
    Rejected,
    /// Reserved. Nothing in this crate moves a relation into or out of it.
    Blocked,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "UPPERCASE")]
#[sqlx(rename_all = "UPPERCASE")]
pub enum ProjectStatus {
    Incubation,
    Production,
    Startup,
    Research,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum MemberRole {
    Owner,
    Member,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "UPPERCASE")]
#[sqlx(rename_all = "UPPERCASE")]
pub enum JoinStatus {
    Pending,
    Approved,
    Rejected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "UPPERCASE")]
#[sqlx(rename_all = "UPPERCASE")]
pub enum EventStatus {
    Upcoming,
    Live,
    Past,
}

impl EventStatus {
    /// How long an event without an explicit end is considered live.
    pub const OPEN_ENDED: time::Duration = time::Duration::hours(2);

    pub fn at(start_at: OffsetDateTime, end_at: Option<OffsetDateTime>, now: OffsetDateTime) -> Self {
        let end_at = end_at.unwrap_or(start_at + Self::OPEN_ENDED);
        if now < start_at {
            EventStatus::Upcoming
        } else if now <= end_at {
            EventStatus::Live
        } else {
            EventStatus::Past
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, FromRow)]
pub struct Profile {
    pub id: Uuid,
    pub name: Option<String>,
    pub specialization: Option<String>,
    pub community_slug: Option<String>,
    pub phone: Option<String>,
    pub linkedin_url: Option<String>,
    pub github_url: Option<String>,
    pub status: ApprovalStatus,
    pub role: Option<String>,
    pub must_change_password: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, FromRow)]
pub struct RoleAssignment {
    pub id: Uuid,
    pub user_id: Uuid,
    pub role: Role,
    pub community_slug: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, FromRow)]
pub struct BuddyRelation {
    pub id: Uuid,
    pub requester_id: Uuid,
    pub recipient_id: Uuid,
    pub status: BuddyStatus,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl BuddyRelation {
    /// The party that isn't `user_id`.
    pub fn other(&self, user_id: Uuid) -> Uuid {
        if self.requester_id == user_id {
            self.recipient_id
        } else {
            self.requester_id
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, FromRow)]
pub struct Project {
    pub id: Uuid,
    pub title: String,
    pub summary: String,
    pub status: ProjectStatus,
    pub owner_id: Uuid,
    pub community_slug: Option<String>,
    pub tech_stack: Json<Vec<String>>,
    pub looking_for: Option<String>,
    pub featured: bool,
    pub flagged: bool,
    pub flagged_note: Option<String>,
    pub archived: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl Project {
    pub fn is_recruiting(&self) -> bool {
        self.looking_for.is_some() && !self.archived
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, FromRow)]
pub struct ProjectMember {
    pub project_id: Uuid,
    pub user_id: Uuid,
    pub role: MemberRole,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, FromRow)]
pub struct JoinRequest {
    pub id: Uuid,
    pub project_id: Uuid,
    pub requester_id: Uuid,
    pub message: String,
    pub status: JoinStatus,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, FromRow)]
pub struct Event {
    pub id: Uuid,
    pub title: String,
    #[serde(with = "time::serde::rfc3339")]
    pub start_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option")]
    pub end_at: Option<OffsetDateTime>,
    pub status: EventStatus,
    pub allow_rsvp: bool,
    pub archived: bool,
    pub is_featured: bool,
    pub community_slug: Option<String>,
    pub created_by: Uuid,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}
