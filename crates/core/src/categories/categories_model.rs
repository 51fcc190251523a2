//! Category domain models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::{Result, ValidationError};
use crate::sync::{RecordKind, SyncMetadata, SyncRecord};

/// Domain model representing a category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    #[serde(flatten)]
    pub sync: SyncMetadata,
    pub name: String,
    pub color_hex: String,
    pub icon_name: String,
    pub is_active: bool,
    pub display_order: i32,
}

/// Input model for creating a new category.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewCategory {
    pub name: String,
    pub color_hex: String,
    pub icon_name: String,
    #[serde(default = "default_active")]
    pub is_active: bool,
    /// Appended after the owner's last category when absent.
    pub display_order: Option<i32>,
}

/// Partial edit of a category; `None` leaves a field untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryUpdate {
    pub name: Option<String>,
    pub color_hex: Option<String>,
    pub icon_name: Option<String>,
    pub is_active: Option<bool>,
    pub display_order: Option<i32>,
}

/// Server-authoritative category fields sent on create/update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryPayload {
    /// Local id, lets the backend deduplicate a retried create.
    pub client_id: String,
    pub name: String,
    pub color_hex: String,
    pub icon_name: String,
    pub is_active: bool,
    pub display_order: i32,
}

/// Category as returned by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryDto {
    pub id: String,
    pub name: String,
    pub color_hex: String,
    #[serde(default)]
    pub icon_name: String,
    #[serde(default = "default_active")]
    pub is_active: bool,
    #[serde(default)]
    pub display_order: i32,
}

fn default_active() -> bool {
    true
}

fn validate_name(name: &str) -> std::result::Result<(), ValidationError> {
    if name.trim().is_empty() {
        return Err(ValidationError::EmptyField("name"));
    }
    Ok(())
}

/// Accepts `#RRGGBB`.
pub fn validate_color_hex(color: &str) -> std::result::Result<(), ValidationError> {
    let valid = color
        .strip_prefix('#')
        .map(|hex| hex.len() == 6 && hex.bytes().all(|b| b.is_ascii_hexdigit()))
        .unwrap_or(false);
    if valid {
        Ok(())
    } else {
        Err(ValidationError::InvalidColor(color.to_string()))
    }
}

impl NewCategory {
    pub fn validate(&self) -> Result<()> {
        validate_name(&self.name)?;
        validate_color_hex(&self.color_hex)?;
        Ok(())
    }
}

impl CategoryUpdate {
    pub fn validate(&self) -> Result<()> {
        if let Some(name) = &self.name {
            validate_name(name)?;
        }
        if let Some(color) = &self.color_hex {
            validate_color_hex(color)?;
        }
        Ok(())
    }

    pub fn apply(self, category: &mut Category) {
        if let Some(name) = self.name {
            category.name = name.trim().to_string();
        }
        if let Some(color) = self.color_hex {
            category.color_hex = color;
        }
        if let Some(icon) = self.icon_name {
            category.icon_name = icon;
        }
        if let Some(active) = self.is_active {
            category.is_active = active;
        }
        if let Some(order) = self.display_order {
            category.display_order = order;
        }
    }
}

impl Category {
    /// A new, pending category owned by `owner_id`. Input must be validated.
    pub fn new_local(
        owner_id: &str,
        input: NewCategory,
        display_order: i32,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            sync: SyncMetadata::new_local(owner_id, now),
            name: input.name.trim().to_string(),
            color_hex: input.color_hex,
            icon_name: input.icon_name,
            is_active: input.is_active,
            display_order: input.display_order.unwrap_or(display_order),
        }
    }
}

impl SyncRecord for Category {
    type Dto = CategoryDto;
    type Payload = CategoryPayload;

    const KIND: RecordKind = RecordKind::Category;

    fn meta(&self) -> &SyncMetadata {
        &self.sync
    }

    fn meta_mut(&mut self) -> &mut SyncMetadata {
        &mut self.sync
    }

    fn dto_id(dto: &CategoryDto) -> &str {
        &dto.id
    }

    fn to_payload(&self) -> CategoryPayload {
        CategoryPayload {
            client_id: self.sync.local_id.clone(),
            name: self.name.clone(),
            color_hex: self.color_hex.clone(),
            icon_name: self.icon_name.clone(),
            is_active: self.is_active,
            display_order: self.display_order,
        }
    }

    fn apply_server_fields(&mut self, dto: &CategoryDto) {
        self.name = dto.name.clone();
        self.color_hex = dto.color_hex.clone();
        self.icon_name = dto.icon_name.clone();
        self.is_active = dto.is_active;
        self.display_order = dto.display_order;
    }

    fn matches_server(&self, dto: &CategoryDto) -> bool {
        self.name == dto.name
            && self.color_hex == dto.color_hex
            && self.icon_name == dto.icon_name
            && self.is_active == dto.is_active
            && self.display_order == dto.display_order
    }

    fn from_server(owner_id: &str, dto: &CategoryDto, now: DateTime<Utc>) -> Self {
        let mut category = Self {
            sync: SyncMetadata::from_server(owner_id, dto.id.clone(), now),
            name: String::new(),
            color_hex: String::new(),
            icon_name: String::new(),
            is_active: true,
            display_order: 0,
        };
        category.apply_server_fields(dto);
        category
    }
}
