use comfy_table::{
    modifiers::UTF8_ROUND_CORNERS,
    presets::{NOTHING, UTF8_FULL},
    Attribute, Cell, CellAlignment, Color, ContentArrangement, Table,
};
use crossterm::style::Stylize;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use super::service::Service;

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProjectCreateRequest {
    pub project_id: String,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub project_id: String,
    #[serde(default)]
    pub health: Health,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_domain: Option<String>,
    #[serde(default)]
    pub services: Vec<Service>,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
#[strum(ascii_case_insensitive)]
pub enum Health {
    On,
    Off,
    #[default]
    #[serde(other)]
    Unknown,
}

impl Health {
    /// We return a comfy-table Color here, since `comfy-table` re-exports
    /// crossterm::style::Color and we depend on both `comfy-table` and `crossterm`
    /// we may end up with two different versions of Color.
    pub fn table_color(&self) -> Color {
        match self {
            Health::On => Color::Green,
            Health::Off => Color::Red,
            Health::Unknown => Color::Yellow,
        }
    }

    pub fn to_string_colored(&self) -> String {
        match self {
            Health::On => self.to_string().green().to_string(),
            Health::Off => self.to_string().red().to_string(),
            Health::Unknown => self.to_string().yellow().to_string(),
        }
    }
}

/// Renders projects and their services, one row per service
pub fn get_projects_table(projects: &[Project], infrastructure: &str, raw: bool) -> String {
    if projects.is_empty() {
        let s = "No projects found\n".to_string();
        if raw {
            return s;
        }
        return s.yellow().bold().to_string();
    }

    let mut table = Table::new();

    if raw {
        table
            .load_preset(NOTHING)
            .set_content_arrangement(ContentArrangement::Disabled)
            .set_header(vec![
                Cell::new("Host").set_alignment(CellAlignment::Left),
                Cell::new("Image").set_alignment(CellAlignment::Left),
                Cell::new("Health").set_alignment(CellAlignment::Left),
            ]);
    } else {
        table
            .load_preset(UTF8_FULL)
            .apply_modifier(UTF8_ROUND_CORNERS)
            .set_content_arrangement(ContentArrangement::DynamicFullWidth)
            .set_header(vec![
                Cell::new("Host")
                    .set_alignment(CellAlignment::Center)
                    .add_attribute(Attribute::Bold),
                Cell::new("Image")
                    .set_alignment(CellAlignment::Center)
                    .add_attribute(Attribute::Bold),
                Cell::new("Health")
                    .set_alignment(CellAlignment::Center)
                    .add_attribute(Attribute::Bold),
            ]);
    }

    for project in projects {
        let project_host = format!("{}.{}", project.project_id, infrastructure);
        let health = Cell::new(project.health);
        table.add_row(vec![
            Cell::new(&project_host).add_attribute(Attribute::Bold),
            Cell::new(""),
            if raw {
                health
            } else {
                health.fg(project.health.table_color())
            },
        ]);

        for service in &project.services {
            let health = Cell::new(service.health);
            table.add_row(vec![
                Cell::new(format!("  {}.{}", service.service_id, project_host)),
                Cell::new(service.image.as_deref().unwrap_or("-")),
                if raw {
                    health
                } else {
                    health.fg(service.health.table_color())
                },
            ]);
        }
    }

    format!("{table}\n")
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;

    #[test]
    fn health_deser() {
        assert_eq!(Health::On, Health::from_str("ON").unwrap());
        let project: Project =
            serde_json::from_str(r#"{"projectId": "p", "health": "degraded"}"#).unwrap();
        assert_eq!(project.health, Health::Unknown);
        assert!(project.services.is_empty());
    }

    #[test]
    fn raw_table_lists_services() {
        let projects: Vec<Project> = serde_json::from_str(
            r#"[{
                "projectId": "shop",
                "health": "on",
                "services": [{"serviceId": "web", "image": "wedeploy/hosting", "health": "off"}]
            }]"#,
        )
        .unwrap();

        let table = get_projects_table(&projects, "wedeploy.io", true);
        assert!(table.contains("shop.wedeploy.io"));
        assert!(table.contains("web.shop.wedeploy.io"));
        assert!(table.contains("wedeploy/hosting"));
    }
}
