//! CodeSetConfig rule kind — the static medical-code reference tables the
//! engine consults: E/M visit hierarchies with expected population usage
//! rates, component/bundle pairs, high-value procedures, low-acuity
//! diagnoses, fixed federal holidays, and service-category code groups.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::schema::CommonMetadata;

// ── YAML-level types ────────────────────────────────────────────────

/// Top-level CodeSetConfig rule document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct CodeSetConfigRule {
    #[serde(rename = "apiVersion")]
    pub api_version: String,
    pub kind: String,
    pub metadata: CommonMetadata,
    pub spec: CodeSetSpec,
}

/// Specification section of a CodeSetConfig rule.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct CodeSetSpec {
    /// Ordered E/M code hierarchies per visit category (ascending complexity).
    pub em_hierarchies: Vec<EmHierarchy>,
    /// Bundled panel codes and the component codes they cover.
    pub bundles: Vec<BundleDef>,
    /// Procedure codes treated as high-value for feature engineering.
    pub high_value_procedures: Vec<String>,
    /// Diagnosis codes considered low-acuity (colds, routine exams).
    pub low_acuity_diagnoses: Vec<String>,
    /// Fixed-date federal holidays as (month, day).
    pub federal_holidays: Vec<HolidayDef>,
    /// Named service categories for rolling-window frequency checks.
    pub service_categories: Vec<ServiceCategoryDef>,
}

/// One visit category's ordered E/M levels, lowest complexity first.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct EmHierarchy {
    pub category: String,
    pub levels: Vec<EmLevel>,
}

/// A single E/M level within a hierarchy.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct EmLevel {
    pub code: String,
    /// Expected population usage rate of this level, in (0, 1].
    pub expected_rate: f64,
    /// High-complexity levels are eligible for upcoding triggers.
    #[serde(default)]
    pub high_complexity: bool,
}

/// A bundled code and its separately billable components.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct BundleDef {
    pub bundle: String,
    pub components: Vec<String>,
}

/// A fixed-date holiday.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct HolidayDef {
    pub month: u32,
    pub day: u32,
    #[serde(default)]
    pub name: Option<String>,
}

/// A service category with its member codes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ServiceCategoryDef {
    pub category: String,
    pub codes: Vec<String>,
}

impl CodeSetSpec {
    /// Structural validation: non-empty hierarchies, rates in (0, 1], no code
    /// claimed by two hierarchies, calendar-valid holidays.
    pub fn validate(&self) -> std::result::Result<(), String> {
        let mut seen = HashSet::new();
        for hierarchy in &self.em_hierarchies {
            if hierarchy.levels.is_empty() {
                return Err(format!("hierarchy '{}' has no levels", hierarchy.category));
            }
            for level in &hierarchy.levels {
                if !(level.expected_rate > 0.0 && level.expected_rate <= 1.0) {
                    return Err(format!(
                        "code {} expected_rate {} outside (0, 1]",
                        level.code, level.expected_rate
                    ));
                }
                if !seen.insert(level.code.clone()) {
                    return Err(format!("code {} appears in two hierarchies", level.code));
                }
            }
        }

        for bundle in &self.bundles {
            if bundle.components.is_empty() {
                return Err(format!("bundle {} has no components", bundle.bundle));
            }
        }

        for holiday in &self.federal_holidays {
            if !(1..=12).contains(&holiday.month) || !(1..=31).contains(&holiday.day) {
                return Err(format!(
                    "invalid holiday date {}/{}",
                    holiday.month, holiday.day
                ));
            }
        }

        Ok(())
    }
}

// ── Compiled (hot-path) types ───────────────────────────────────────

/// Lookup-optimized reference tables. Built once during config load and
/// shared read-only across detectors.
#[derive(Debug, Clone, Default)]
pub struct CompiledCodeSets {
    /// Visit category -> ordered E/M levels (lowest complexity first).
    pub em_hierarchies: HashMap<String, Vec<EmLevel>>,
    /// E/M code -> (visit category, level index within the hierarchy).
    pub level_index: HashMap<String, (String, usize)>,
    /// Component code -> bundle codes that cover it.
    pub bundles_for_component: HashMap<String, Vec<String>>,
    /// Bundle code -> component codes it covers.
    pub bundle_components: HashMap<String, HashSet<String>>,
    /// High-value procedure codes.
    pub high_value_procedures: HashSet<String>,
    /// Low-acuity diagnosis codes.
    pub low_acuity_diagnoses: HashSet<String>,
    /// Fixed federal holidays as (month, day).
    pub federal_holidays: HashSet<(u32, u32)>,
    /// Service category -> member codes.
    pub service_categories: HashMap<String, HashSet<String>>,
}

impl CompiledCodeSets {
    /// Whether a calendar date falls on a fixed federal holiday.
    pub fn is_federal_holiday(&self, month: u32, day: u32) -> bool {
        self.federal_holidays.contains(&(month, day))
    }

    /// The service category a procedure code belongs to, if any.
    pub fn category_of(&self, code: &str) -> Option<&str> {
        self.service_categories
            .iter()
            .find(|(_, codes)| codes.contains(code))
            .map(|(category, _)| category.as_str())
    }

    /// Levels below `code` in its hierarchy, nearest first.
    pub fn lower_levels(&self, code: &str) -> Vec<&EmLevel> {
        let Some((category, idx)) = self.level_index.get(code) else {
            return Vec::new();
        };
        let Some(levels) = self.em_hierarchies.get(category) else {
            return Vec::new();
        };
        levels[..*idx].iter().rev().collect()
    }
}

impl CodeSetConfigRule {
    /// Compile the YAML tables into lookup maps.
    pub fn compile(&self) -> CompiledCodeSets {
        let spec = &self.spec;

        let mut em_hierarchies = HashMap::new();
        let mut level_index = HashMap::new();
        for hierarchy in &spec.em_hierarchies {
            for (idx, level) in hierarchy.levels.iter().enumerate() {
                level_index.insert(level.code.clone(), (hierarchy.category.clone(), idx));
            }
            em_hierarchies.insert(hierarchy.category.clone(), hierarchy.levels.clone());
        }

        let mut bundles_for_component: HashMap<String, Vec<String>> = HashMap::new();
        let mut bundle_components = HashMap::new();
        for bundle in &spec.bundles {
            let components: HashSet<String> = bundle.components.iter().cloned().collect();
            for component in &bundle.components {
                bundles_for_component
                    .entry(component.clone())
                    .or_default()
                    .push(bundle.bundle.clone());
            }
            bundle_components.insert(bundle.bundle.clone(), components);
        }

        CompiledCodeSets {
            em_hierarchies,
            level_index,
            bundles_for_component,
            bundle_components,
            high_value_procedures: spec.high_value_procedures.iter().cloned().collect(),
            low_acuity_diagnoses: spec.low_acuity_diagnoses.iter().cloned().collect(),
            federal_holidays: spec
                .federal_holidays
                .iter()
                .map(|h| (h.month, h.day))
                .collect(),
            service_categories: spec
                .service_categories
                .iter()
                .map(|c| (c.category.clone(), c.codes.iter().cloned().collect()))
                .collect(),
        }
    }
}
