//! Policy configuration flattening
//!
//! Each policy category exposes its configuration at a different Graph
//! endpoint and in a different shape. [`config_endpoint`] picks the endpoint
//! and the matching [`Flattener`] turns the response into `name = value`
//! pairs that can be compared across subjects.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};

use crate::models::{ConfigItem, PolicyCategory, INTENT_ODATA_TYPE, NOT_CONFIGURED};

/// Metadata fields that carry no configuration
const SKIP_FIELDS: &[&str] = &[
    "id",
    "version",
    "createdDateTime",
    "lastModifiedDateTime",
    "displayName",
    "description",
    "assignments",
    "roleScopeTagIds",
    "supportsScopeTags",
    "deviceManagementApplicabilityRuleOsEdition",
    "deviceManagementApplicabilityRuleOsVersion",
    "deviceManagementApplicabilityRuleDeviceMode",
];

const DECODED_TEXT_LIMIT: usize = 500;
const SCRIPT_LIMIT: usize = 500;
const HEALTH_SCRIPT_LIMIT: usize = 300;

static BASE64_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9+/]+=*$").expect("valid base64 regex"));

/// How a configuration response is turned into items
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flattener {
    Generic,
    SettingsCatalog,
    Intent,
    AdministrativeTemplate,
    Script,
    HealthScript,
}

impl Flattener {
    pub fn apply(&self, response: &Value) -> Vec<ConfigItem> {
        match self {
            Flattener::Generic => flatten_generic(response),
            Flattener::SettingsCatalog => flatten_settings_catalog(response),
            Flattener::Intent => flatten_intent_settings(response),
            Flattener::AdministrativeTemplate => flatten_admin_templates(response),
            Flattener::Script => flatten_script(response),
            Flattener::HealthScript => flatten_health_script(response),
        }
    }
}

/// Relative Graph path plus flattener for a policy's configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigEndpoint {
    pub path: String,
    pub flattener: Flattener,
}

/// Pick the configuration endpoint for a policy.
///
/// App protection policies live under a per-platform collection, chosen from
/// the `@odata.type` hint. Intent-sourced records are recognised by their
/// hint too, whatever their category.
pub fn config_endpoint(
    policy_id: &str,
    category: PolicyCategory,
    odata_type_hint: Option<&str>,
) -> ConfigEndpoint {
    let id = urlencoding::encode(policy_id);
    let generic = |collection: &str| ConfigEndpoint {
        path: format!("{}/{}", collection, id),
        flattener: Flattener::Generic,
    };

    if odata_type_hint.is_some_and(|t| t.eq_ignore_ascii_case(INTENT_ODATA_TYPE)) {
        return ConfigEndpoint {
            path: format!("/deviceManagement/intents/{}/settings", id),
            flattener: Flattener::Intent,
        };
    }

    match category {
        PolicyCategory::DeviceConfiguration => generic("/deviceManagement/deviceConfigurations"),
        PolicyCategory::CompliancePolicy => generic("/deviceManagement/deviceCompliancePolicies"),
        PolicyCategory::Application => generic("/deviceAppManagement/mobileApps"),
        PolicyCategory::Script => ConfigEndpoint {
            path: format!("/deviceManagement/deviceManagementScripts/{}", id),
            flattener: Flattener::Script,
        },
        PolicyCategory::ProactiveRemediationScript => ConfigEndpoint {
            path: format!("/deviceManagement/deviceHealthScripts/{}", id),
            flattener: Flattener::HealthScript,
        },
        PolicyCategory::AdministrativeTemplate => ConfigEndpoint {
            path: format!(
                "/deviceManagement/groupPolicyConfigurations/{}/definitionValues?$expand=definition",
                id
            ),
            flattener: Flattener::AdministrativeTemplate,
        },
        PolicyCategory::AppConfigurationPolicy => {
            generic("/deviceAppManagement/mobileAppConfigurations")
        }
        PolicyCategory::AppProtectionPolicy => {
            let hint = odata_type_hint.unwrap_or_default().to_lowercase();
            if hint.contains("android") {
                generic("/deviceAppManagement/androidManagedAppProtections")
            } else if hint.contains("ios") {
                generic("/deviceAppManagement/iosManagedAppProtections")
            } else if hint.contains("windows") {
                generic("/deviceAppManagement/windowsManagedAppProtections")
            } else {
                generic("/deviceAppManagement/managedAppPolicies")
            }
        }
        PolicyCategory::AutopilotProfile => {
            generic("/deviceManagement/windowsAutopilotDeploymentProfiles")
        }
        PolicyCategory::EnrollmentStatusPage => {
            generic("/deviceManagement/deviceEnrollmentConfigurations")
        }
        PolicyCategory::CloudPcProvisioningPolicy => {
            generic("/deviceManagement/virtualEndpoint/provisioningPolicies")
        }
        PolicyCategory::CloudPcUserSetting => {
            generic("/deviceManagement/virtualEndpoint/userSettings")
        }
        // Settings catalog, endpoint security and anything unrecognised
        _ => ConfigEndpoint {
            path: format!("/deviceManagement/configurationPolicies/{}/settings", id),
            flattener: Flattener::SettingsCatalog,
        },
    }
}

/// `camelCaseName` -> `Camel Case Name`
pub fn format_field_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 8);
    for (i, c) in name.chars().enumerate() {
        if c.is_ascii_uppercase() {
            out.push(' ');
            out.push(c);
        } else if i == 0 {
            out.extend(c.to_uppercase());
        } else {
            out.push(c);
        }
    }
    out.trim().to_string()
}

fn is_likely_base64(s: &str) -> bool {
    if s.len() < 20 || s.len() % 4 != 0 || !BASE64_RE.is_match(s) {
        return false;
    }
    // Plain words and identifiers rarely mix digits with both cases
    let has_digit = s.chars().any(|c| c.is_ascii_digit());
    let has_lower = s.chars().any(|c| c.is_ascii_lowercase());
    let has_upper = s.chars().any(|c| c.is_ascii_uppercase());
    has_digit && has_lower && has_upper
}

fn is_printable(b: u8) -> bool {
    (32..=126).contains(&b) || matches!(b, b'\t' | b'\n' | b'\r')
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() > max_chars {
        let head: String = text.chars().take(max_chars).collect();
        format!("{}...", head)
    } else {
        text.to_string()
    }
}

/// Decode base64-looking strings whose content is mostly printable text
pub fn try_decode_base64(s: &str) -> String {
    if !is_likely_base64(s) {
        return s.to_string();
    }
    match STANDARD.decode(s) {
        Ok(bytes) if !bytes.is_empty() => {
            let printable = bytes.iter().filter(|b| is_printable(**b)).count();
            if printable as f64 / bytes.len() as f64 > 0.8 {
                truncate(&String::from_utf8_lossy(&bytes), DECODED_TEXT_LIMIT)
            } else {
                s.to_string()
            }
        }
        _ => s.to_string(),
    }
}

fn plain(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Render any JSON value for display
pub fn format_value(value: &Value) -> String {
    match value {
        Value::Null => NOT_CONFIGURED.to_string(),
        Value::Bool(true) => "Yes".to_string(),
        Value::Bool(false) => "No".to_string(),
        Value::String(s) => try_decode_base64(s),
        Value::Number(n) => n.to_string(),
        Value::Array(items) => match items.first() {
            None => "None".to_string(),
            Some(Value::Object(_)) => format!("{} item(s)", items.len()),
            Some(_) => items
                .iter()
                .map(|v| match v {
                    Value::String(s) => try_decode_base64(s),
                    other => plain(other),
                })
                .collect::<Vec<_>>()
                .join(", "),
        },
        Value::Object(map) => {
            let parts: Vec<String> = map
                .iter()
                .filter(|(k, _)| !k.starts_with('@'))
                .map(|(k, v)| format!("{}: {}", format_field_name(k), format_value(v)))
                .collect();
            if parts.is_empty() {
                "{}".to_string()
            } else {
                parts.join("; ")
            }
        }
    }
}

/// Every non-metadata field of an entity, OMA-URI settings expanded
pub fn flatten_generic(response: &Value) -> Vec<ConfigItem> {
    let Some(map) = response.as_object() else {
        return Vec::new();
    };

    let mut items = Vec::new();
    for (key, value) in map {
        if key.starts_with('@') || SKIP_FIELDS.contains(&key.as_str()) {
            continue;
        }
        if key == "omaSettings" {
            if let Value::Array(settings) = value {
                items.extend(flatten_oma_settings(settings));
                continue;
            }
        }
        items.push(ConfigItem::new(format_field_name(key), format_value(value)));
    }
    items
}

const TYPED_OMA_VALUES: &[&str] = &[
    "String",
    "Integer",
    "Boolean",
    "Base64",
    "DateTime",
    "FloatingPoint",
];

fn flatten_oma_settings(settings: &[Value]) -> Vec<ConfigItem> {
    let mut items = Vec::new();
    for setting in settings.iter().filter_map(Value::as_object) {
        let display_name = setting
            .get("displayName")
            .and_then(Value::as_str)
            .unwrap_or("OMA Setting");

        if let Some(uri) = setting.get("omaUri").and_then(Value::as_str) {
            items.push(ConfigItem::new(format!("{} (URI)", display_name), uri));
        }

        let odata_type = setting
            .get("@odata.type")
            .and_then(Value::as_str)
            .unwrap_or_default();
        let typed = TYPED_OMA_VALUES.iter().any(|t| odata_type.contains(t));
        let value = setting.get("value").filter(|v| !v.is_null()).or_else(|| {
            if typed {
                None
            } else {
                setting
                    .get("secretReferenceValueId")
                    .filter(|v| !v.is_null())
            }
        });

        if let Some(value) = value {
            items.push(ConfigItem::new(
                format!("{} (Value)", display_name),
                format_value(value),
            ));
        }
    }
    items
}

/// Last `_`-separated segment of a definition or choice id, title-cased
fn last_segment_name(raw: &str) -> String {
    format_field_name(raw.rsplit('_').next().unwrap_or(raw))
}

fn setting_instance_items(instance: &Map<String, Value>, prefix: Option<&str>) -> Vec<ConfigItem> {
    let definition_id = instance
        .get("settingDefinitionId")
        .and_then(Value::as_str)
        .unwrap_or_default();
    let base_name = match prefix {
        Some(prefix) => format!("{} > {}", prefix, last_segment_name(definition_id)),
        None => last_segment_name(definition_id),
    };

    let mut items = Vec::new();

    if let Some(simple) = instance.get("simpleSettingValue").and_then(Value::as_object) {
        if let Some(value) = simple.get("value") {
            items.push(ConfigItem::new(base_name.clone(), format_value(value)));
        }
    }

    if let Some(choice) = instance.get("choiceSettingValue").and_then(Value::as_object) {
        if let Some(value) = choice.get("value") {
            let raw = value.as_str().unwrap_or_default();
            items.push(ConfigItem::new(base_name.clone(), last_segment_name(raw)));
        }
        if let Some(children) = choice.get("children").and_then(Value::as_array) {
            for child in children.iter().filter_map(Value::as_object) {
                items.extend(setting_instance_items(child, Some(&base_name)));
            }
        }
    }

    if let Some(collection) = instance
        .get("choiceSettingCollectionValue")
        .and_then(Value::as_array)
    {
        let values: Vec<String> = collection
            .iter()
            .filter_map(|item| item.get("value"))
            .map(|v| last_segment_name(v.as_str().unwrap_or_default()))
            .collect();
        if !values.is_empty() {
            items.push(ConfigItem::new(base_name.clone(), values.join(", ")));
        }
    }

    if let Some(groups) = instance
        .get("groupSettingCollectionValue")
        .and_then(Value::as_array)
    {
        for (i, group) in groups.iter().enumerate() {
            let group_prefix = if groups.len() > 1 {
                format!("{} [{}]", base_name, i + 1)
            } else {
                base_name.clone()
            };
            if let Some(children) = group.get("children").and_then(Value::as_array) {
                for child in children.iter().filter_map(Value::as_object) {
                    items.extend(setting_instance_items(child, Some(&group_prefix)));
                }
            }
        }
    }

    if let Some(collection) = instance
        .get("simpleSettingCollectionValue")
        .and_then(Value::as_array)
    {
        let values: Vec<String> = collection
            .iter()
            .filter_map(|item| match item {
                Value::Object(obj) => obj.get("value").map(plain),
                Value::String(s) => Some(s.clone()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            })
            .collect();
        if !values.is_empty() {
            items.push(ConfigItem::new(base_name, values.join(", ")));
        }
    }

    items
}

/// `configurationPolicies/{id}/settings` response
pub fn flatten_settings_catalog(response: &Value) -> Vec<ConfigItem> {
    let settings = response
        .get("value")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();

    let items: Vec<ConfigItem> = settings
        .iter()
        .filter_map(|s| s.get("settingInstance").and_then(Value::as_object))
        .flat_map(|instance| setting_instance_items(instance, None))
        .collect();

    if items.is_empty() && !settings.is_empty() {
        return vec![ConfigItem::new(
            "Settings Count",
            format!("{} setting(s) configured", settings.len()),
        )];
    }
    items
}

/// `intents/{id}/settings` response: `definitionId` plus a JSON-encoded value
pub fn flatten_intent_settings(response: &Value) -> Vec<ConfigItem> {
    response
        .get("value")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default()
        .iter()
        .filter_map(|setting| {
            let definition = setting.get("definitionId").and_then(Value::as_str)?;
            let short = definition.rsplit('_').next().unwrap_or(definition);
            let value = match setting.get("valueJson").and_then(Value::as_str) {
                Some(raw) => serde_json::from_str::<Value>(raw)
                    .map(|v| format_value(&v))
                    .unwrap_or_else(|_| raw.to_string()),
                None => format_value(setting.get("value").unwrap_or(&Value::Null)),
            };
            Some(ConfigItem::new(format_field_name(short), value))
        })
        .collect()
}

/// `definitionValues?$expand=definition` response
pub fn flatten_admin_templates(response: &Value) -> Vec<ConfigItem> {
    response
        .get("value")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default()
        .iter()
        .map(|item| {
            let name = item
                .pointer("/definition/displayName")
                .and_then(Value::as_str)
                .unwrap_or("Unknown Setting");
            let value = match item.get("enabled").and_then(Value::as_bool) {
                Some(true) => "Enabled",
                Some(false) => "Disabled",
                None => NOT_CONFIGURED,
            };
            ConfigItem::new(name, value)
        })
        .collect()
}

fn decoded_script(response: &Value, field: &str, label: &str, limit: usize) -> Option<ConfigItem> {
    let encoded = response.get(field).and_then(Value::as_str)?;
    if encoded.is_empty() {
        return None;
    }
    let bytes = STANDARD.decode(encoded).ok()?;
    Some(ConfigItem::new(
        label,
        truncate(&String::from_utf8_lossy(&bytes), limit),
    ))
}

pub fn flatten_script(response: &Value) -> Vec<ConfigItem> {
    let mut items = flatten_generic(response);
    items.extend(decoded_script(response, "scriptContent", "Script Content", SCRIPT_LIMIT));
    items
}

pub fn flatten_health_script(response: &Value) -> Vec<ConfigItem> {
    let mut items = flatten_generic(response);
    items.extend(decoded_script(
        response,
        "detectionScriptContent",
        "Detection Script",
        HEALTH_SCRIPT_LIMIT,
    ));
    items.extend(decoded_script(
        response,
        "remediationScriptContent",
        "Remediation Script",
        HEALTH_SCRIPT_LIMIT,
    ));
    items
}
