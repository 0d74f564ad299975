use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use comfy_table::{
    modifiers::UTF8_ROUND_CORNERS,
    presets::{NOTHING, UTF8_FULL},
    Attribute, Cell, CellAlignment, Color, ContentArrangement, Table,
};
use crossterm::style::Stylize;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Metadata key pointing an activity at a service
pub const SERVICE_ID_KEY: &str = "serviceId";

#[derive(Debug, Clone, PartialEq, Eq, Hash, Display, Serialize, Deserialize, EnumString)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum ActivityType {
    BuildPending,
    BuildStarted,
    BuildFailed,
    BuildSucceeded,
    DeployPending,
    DeployStarted,
    DeployFailed,
    DeploySucceeded,
    CollaboratorInvited,
    CollaboratorAccepted,
    CollaboratorLeft,
    CollaboratorDeleted,
    CustomDomainUpdated,
    ProjectCreated,
    ProjectDeleted,

    /// Forward compatibility
    #[doc(hidden)]
    #[serde(untagged)]
    #[strum(default, to_string = "{0}")]
    Unknown(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum ActivityCategory {
    Build,
    Deploy,
}

impl ActivityType {
    /// The types emitted while a service is built and rolled out
    pub const DEPLOYMENT: [ActivityType; 8] = [
        ActivityType::BuildPending,
        ActivityType::BuildStarted,
        ActivityType::BuildFailed,
        ActivityType::BuildSucceeded,
        ActivityType::DeployPending,
        ActivityType::DeployStarted,
        ActivityType::DeployFailed,
        ActivityType::DeploySucceeded,
    ];

    pub fn is_deployment_related(&self) -> bool {
        self.category().is_some()
    }

    /// Types that are recorded as a service's state. Pending and started
    /// events only change what is displayed.
    pub fn is_state_defining(&self) -> bool {
        matches!(
            self,
            ActivityType::BuildSucceeded
                | ActivityType::BuildFailed
                | ActivityType::DeployFailed
                | ActivityType::DeploySucceeded
        )
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, ActivityType::BuildFailed | ActivityType::DeployFailed)
    }

    pub fn is_final(&self) -> bool {
        self.is_failure() || *self == ActivityType::DeploySucceeded
    }

    pub fn category(&self) -> Option<ActivityCategory> {
        match self {
            ActivityType::BuildPending
            | ActivityType::BuildStarted
            | ActivityType::BuildFailed
            | ActivityType::BuildSucceeded => Some(ActivityCategory::Build),
            ActivityType::DeployPending
            | ActivityType::DeployStarted
            | ActivityType::DeployFailed
            | ActivityType::DeploySucceeded => Some(ActivityCategory::Deploy),
            _ => None,
        }
    }

    /// Human phrase shown next to a service while it is being deployed
    pub fn phrase(&self) -> Option<&'static str> {
        let phrase = match self {
            ActivityType::BuildPending => "build pending",
            ActivityType::BuildStarted => "build started",
            ActivityType::BuildFailed => "build failed",
            ActivityType::BuildSucceeded => "build successful",
            ActivityType::DeployPending => "deploy pending",
            ActivityType::DeployStarted => "deploy started",
            ActivityType::DeployFailed => "deploy failed",
            ActivityType::DeploySucceeded => "deployed",
            _ => return None,
        };

        Some(phrase)
    }

    /// We return a comfy-table Color here, see [`super::project::Health::table_color`]
    pub fn table_color(&self) -> Color {
        match self {
            ActivityType::BuildFailed | ActivityType::DeployFailed => Color::Red,
            ActivityType::DeploySucceeded => Color::Green,
            t if t.is_deployment_related() => Color::Cyan,
            _ => Color::Blue,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Activity {
    pub id: String,
    /// Milliseconds since the unix epoch
    pub created_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit: Option<String>,
    pub project_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_uid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_uid: Option<String>,
    pub r#type: ActivityType,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl Activity {
    pub fn service_id(&self) -> Option<&str> {
        self.metadata.get(SERVICE_ID_KEY).map(String::as_str)
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.created_at)
    }
}

/// Activities as returned by the API, newest first
#[derive(Debug, Default, Deserialize, Serialize, Clone, PartialEq)]
#[serde(transparent)]
pub struct Activities(pub Vec<Activity>);

impl Activities {
    /// Flips the order in place, eg. to process oldest first
    pub fn reverse(&mut self) {
        self.0.reverse();
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Activity> {
        self.0.iter()
    }
}

impl IntoIterator for Activities {
    type Item = Activity;
    type IntoIter = std::vec::IntoIter<Activity>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

/// Server side filters for listing activities
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ActivitiesFilter {
    pub commit: Option<String>,
    pub group_uid: Option<String>,
    pub limit: Option<u32>,
    pub types: Vec<ActivityType>,
}

impl ActivitiesFilter {
    pub fn to_query(&self) -> Vec<(&'static str, String)> {
        let mut query = vec![];
        if let Some(ref commit) = self.commit {
            query.push(("commit", commit.clone()));
        }
        if let Some(ref group_uid) = self.group_uid {
            query.push(("groupUid", group_uid.clone()));
        }
        if let Some(limit) = self.limit {
            query.push(("limit", limit.to_string()));
        }
        if !self.types.is_empty() {
            let types: Vec<String> = self.types.iter().map(ToString::to_string).collect();
            query.push(("type", types.join(",")));
        }
        query
    }
}

pub fn get_activities_table(activities: &Activities, raw: bool) -> String {
    if activities.is_empty() {
        let s = "No activities found\n".to_string();
        if raw {
            return s;
        }
        return s.yellow().bold().to_string();
    }

    let mut table = Table::new();
    let headers = ["Time", "Type", "Service", "Commit"];

    if raw {
        table
            .load_preset(NOTHING)
            .set_content_arrangement(ContentArrangement::Disabled)
            .set_header(
                headers
                    .iter()
                    .map(|h| Cell::new(h).set_alignment(CellAlignment::Left)),
            );
    } else {
        table
            .load_preset(UTF8_FULL)
            .apply_modifier(UTF8_ROUND_CORNERS)
            .set_content_arrangement(ContentArrangement::DynamicFullWidth)
            .set_header(headers.iter().map(|h| {
                Cell::new(h)
                    .set_alignment(CellAlignment::Center)
                    .add_attribute(Attribute::Bold)
            }));
    }

    for activity in activities.iter() {
        let time = activity
            .created_at()
            .map(|t| t.format("%Y-%m-%dT%H:%M:%SZ").to_string())
            .unwrap_or_default();
        let r#type = Cell::new(&activity.r#type);
        let commit: String = activity
            .commit
            .as_deref()
            .unwrap_or("-")
            .chars()
            .take(7)
            .collect();

        table.add_row(vec![
            Cell::new(time),
            if raw {
                r#type
            } else {
                r#type.fg(activity.r#type.table_color())
            },
            Cell::new(activity.service_id().unwrap_or("-")),
            Cell::new(commit),
        ]);
    }

    format!("{table}\n")
}
