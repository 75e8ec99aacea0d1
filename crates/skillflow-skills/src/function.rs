//! `function` skills: named functions from a compile-time table.
//!
//! A manifest selects a function with `config.function_name`. The function
//! receives the step's resolved inputs by name. A map result becomes the step
//! output as is; anything else is wrapped as `{"result": value}`.

use crate::error::SkillError;
use async_trait::async_trait;
use serde_json::{json, Value};
use skillflow_flow::{Capability, CapabilityError};
use skillflow_protocol::models::{SkillManifest, ValueMap};
use std::collections::HashMap;
use tracing::{debug, info};

/// Signature of a table function
pub type SkillFunction = fn(&ValueMap) -> anyhow::Result<Value>;

/// Locations recognized by `extract_location_hint`, checked in order
pub const SUPPORTED_LOCATIONS: &[&str] = &[
    "miami",
    "lake tahoe",
    "austin",
    "san diego",
    "boston",
    "fredericksburg",
    "new york",
    "los angeles",
    "san francisco",
    "seattle",
    "denver",
    "chicago",
    "orlando",
    "las vegas",
];

/// Named functions available to `function` skills
#[derive(Debug, Clone, Default)]
pub struct FunctionTable {
    functions: HashMap<String, SkillFunction>,
}

impl FunctionTable {
    /// An empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// The table of built-in functions
    pub fn builtin() -> Self {
        let mut table = Self::new();
        table.register("extract_location_hint", extract_location_hint);
        table.register("format_price", format_price);
        table.register("calculate_total_price", calculate_total_price);
        table
    }

    /// Add (or replace) a function
    pub fn register(&mut self, name: impl Into<String>, function: SkillFunction) {
        self.functions.insert(name.into(), function);
    }

    /// Look up a function by name
    pub fn get(&self, name: &str) -> Option<SkillFunction> {
        self.functions.get(name).copied()
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.functions.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

/// Factory for `function` skills backed by `table`
pub fn factory(
    table: FunctionTable,
) -> impl Fn(&SkillManifest) -> Result<Box<dyn Capability>, CapabilityError> + Send + Sync + 'static
{
    move |manifest: &SkillManifest| {
        Ok(Box::new(FunctionCapability::from_manifest(manifest, &table)) as Box<dyn Capability>)
    }
}

/// Capability running one table function
#[derive(Debug)]
pub struct FunctionCapability {
    skill_id: String,
    name: Option<String>,
    function: Option<SkillFunction>,
}

impl FunctionCapability {
    /// Resolve the manifest's function in `table`.
    ///
    /// An unknown or missing name does not fail construction; every call then
    /// fails, so the manifest's fallback applies.
    pub fn from_manifest(manifest: &SkillManifest, table: &FunctionTable) -> Self {
        let name = manifest.config.function_name.clone();
        let function = name.as_deref().and_then(|n| table.get(n));
        if let (Some(n), Some(_)) = (&name, function) {
            info!("Using built-in function: {}", n);
        }
        Self {
            skill_id: manifest.skill_id.clone(),
            name,
            function,
        }
    }

    fn call(&self, inputs: &ValueMap) -> Result<ValueMap, CapabilityError> {
        let function = match (&self.name, self.function) {
            (_, Some(function)) => function,
            (Some(name), None) => return Err(SkillError::UnknownFunction(name.clone()).into()),
            (None, None) => return Err(SkillError::NoFunction(self.skill_id.clone()).into()),
        };

        debug!(skill_id = %self.skill_id, "Calling function {:?}", self.name);
        match function(inputs)? {
            Value::Object(map) => Ok(map),
            other => {
                let mut wrapped = ValueMap::new();
                wrapped.insert("result".to_string(), other);
                Ok(wrapped)
            }
        }
    }
}

#[async_trait]
impl Capability for FunctionCapability {
    async fn execute(&self, inputs: &ValueMap) -> Result<ValueMap, CapabilityError> {
        self.call(inputs)
    }

    async fn mock_execute(
        &self,
        _manifest: &SkillManifest,
        inputs: &ValueMap,
    ) -> Result<ValueMap, CapabilityError> {
        self.call(inputs)
    }
}

fn required_str<'a>(inputs: &'a ValueMap, field: &str) -> Result<&'a str, SkillError> {
    match inputs.get(field) {
        Some(Value::String(s)) => Ok(s),
        Some(other) => Err(SkillError::invalid_input(
            field,
            format!("expected a string, got {}", other),
        )),
        None => Err(SkillError::invalid_input(field, "missing")),
    }
}

fn required_number(inputs: &ValueMap, field: &str) -> Result<f64, SkillError> {
    inputs
        .get(field)
        .and_then(Value::as_f64)
        .ok_or_else(|| SkillError::invalid_input(field, "expected a number"))
}

fn number_or(inputs: &ValueMap, field: &str, default: f64) -> Result<f64, SkillError> {
    match inputs.get(field) {
        None | Some(Value::Null) => Ok(default),
        Some(value) => value
            .as_f64()
            .ok_or_else(|| SkillError::invalid_input(field, "expected a number")),
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn title_case(text: &str) -> String {
    text.split(' ')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// `12345.5` as `12,345.50`
fn with_thousands(amount: f64) -> String {
    let fixed = format!("{:.2}", amount.abs());
    let (whole, fraction) = fixed.split_once('.').unwrap_or((fixed.as_str(), "00"));
    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (i, digit) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }
    let sign = if amount < 0.0 && fixed != "0.00" { "-" } else { "" };
    format!("{}{}.{}", sign, grouped, fraction)
}

/// Find the first supported location mentioned in `query_text`.
///
/// Output: `{"location": "Lake Tahoe"}`, or `{"location": null}`.
pub fn extract_location_hint(inputs: &ValueMap) -> anyhow::Result<Value> {
    let query = required_str(inputs, "query_text")?.to_lowercase();
    let location = SUPPORTED_LOCATIONS
        .iter()
        .find(|loc| query.contains(*loc))
        .map(|loc| title_case(loc));
    Ok(json!({ "location": location }))
}

/// Format `amount` in `currency` (default `USD`).
///
/// Output: `{"formatted": "$1,234.50"}` or `{"formatted": "1,234.50 EUR"}`.
pub fn format_price(inputs: &ValueMap) -> anyhow::Result<Value> {
    let amount = required_number(inputs, "amount")?;
    let currency = inputs
        .get("currency")
        .and_then(Value::as_str)
        .unwrap_or("USD");
    let formatted = if currency == "USD" {
        format!("${}", with_thousands(amount))
    } else {
        format!("{} {}", with_thousands(amount), currency)
    };
    Ok(json!({ "formatted": formatted }))
}

/// Booking total from a nightly price, fees and a tax rate
pub fn calculate_total_price(inputs: &ValueMap) -> anyhow::Result<Value> {
    let price_per_night = required_number(inputs, "price_per_night")?;
    let nights = inputs
        .get("nights")
        .and_then(Value::as_i64)
        .ok_or_else(|| SkillError::invalid_input("nights", "expected an integer"))?;
    let cleaning_fee = number_or(inputs, "cleaning_fee", 0.0)?;
    let service_fee = number_or(inputs, "service_fee", 0.0)?;
    let tax_rate = number_or(inputs, "tax_rate", 0.0)?;

    let subtotal = price_per_night * nights as f64;
    let taxes = subtotal * tax_rate;
    let total = subtotal + cleaning_fee + service_fee + taxes;

    Ok(json!({
        "subtotal": subtotal,
        "cleaning_fee": cleaning_fee,
        "service_fee": service_fee,
        "taxes": round2(taxes),
        "total": round2(total),
        "nights": nights,
    }))
}
