// /////////////////////////////////////////////////////////////////////////////
// Privacy-Preserving Pipeline Orchestrator
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # FlaskDP Jobs (Differential Privacy)
//!
//! Jobs targeting the FlaskDP service. Only components tagged
//! `flaskdp:anonymizable` are eligible. Each job parses numeric values out
//! of the selected attributes, builds a request keyed by item id, lets the
//! service apply the noise mechanism, and writes the noised values back.
//!
//! Items are formed two ways:
//!
//! - with an `objects` parameter, one item per matching object, drawing
//!   the values from the object's matching attributes;
//! - otherwise, one item per targeted attribute type over the top-level
//!   attributes.
//!
//! Attribute values that do not parse as numbers are logged and excluded
//! from both the request and the write-back, keeping the two aligned.
//!
//! [`FromTechnique`] selects the mechanism by scheme string; the
//! fixed-mechanism variants ([`Laplace`], [`Gaussian`], ...) hard-wire it.
//! [`FromPrivacyPolicy`] walks the privacy policy and emits one
//! [`FromTechnique`] per DP-flagged attribute policy or object template.

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, error, info};

use anonymizer_domain::entities::{Component, ComponentContainer, Request};
use anonymizer_domain::policies::PrivacyPolicy;
use anonymizer_domain::PipelineError;

use crate::execution::job::{GeneratedJob, Job, JobContext, JobOutput};
use crate::infrastructure::clients::flaskdp::FlaskDpClient;
use crate::models::flaskdp::{FlaskDpRequest, ItemRequest, Mechanism};

/// Marks a component as a candidate for the FlaskDP backend.
pub const TYPE_ANONYMIZABLE_BY_FLASKDP: &str = "flaskdp:anonymizable";

const PARAM_ATTRIBUTES: &str = "attributes";
const PARAM_EPSILON: &str = "epsilon";
const PARAM_DELTA: &str = "delta";
const PARAM_SENSITIVITY: &str = "sensitivity";
const PARAM_UPPER: &str = "upper";
const PARAM_LOWER: &str = "lower";
const PARAM_OBJECTS: &str = "objects";
const PARAM_TECHNIQUE: &str = "technique";
const PARAM_FLASKDP_URL: &str = "flaskdp_url";
const PARAM_PRIVACY_POLICY_LOCATION: &str = "privacy_policy_location";

/// The FlaskDP base URL: per-job override or the configured service.
fn flaskdp_url(ctx: &JobContext<'_>) -> Result<String, PipelineError> {
    if let Some(url) = ctx.arg(PARAM_FLASKDP_URL).and_then(Value::as_str) {
        return Ok(url.to_string());
    }
    ctx.env
        .services()
        .settings
        .snapshot()
        .services
        .flaskdp
        .map(|s| s.url)
        .ok_or_else(|| PipelineError::JobFailed("FlaskDP service not configured".into()))
}

/// Noise parameters shared by one request.
#[derive(Debug, Clone, Copy)]
struct DpParameters {
    epsilon: f64,
    delta: f64,
    sensitivity: f64,
    upper: f64,
    lower: f64,
    mechanism: Mechanism,
}

/// One item of the request plus the identities needed for the write-back.
struct PreparedItem {
    id: String,
    values: Vec<f64>,
    /// Names of the attributes the values came from, in order.
    attribute_names: Vec<String>,
    /// Index of the owning object among the matching objects, if any.
    object_index: Option<usize>,
}

/// AND-filter an object against the eligibility tag plus all listed types.
fn object_matches(component: &Component, objects: &[String]) -> bool {
    let mut types: Vec<&str> = vec![TYPE_ANONYMIZABLE_BY_FLASKDP];
    types.extend(objects.iter().map(String::as_str));
    component.as_object().is_some() && component.type_is(&types)
}

/// Collects the numeric attributes of a component list matching the tag
/// plus all listed attribute types.
fn numeric_attributes(job: &str, components: &[Component], attributes: &[String]) -> (Vec<f64>, Vec<String>) {
    let mut type_filter: Vec<&str> = vec![TYPE_ANONYMIZABLE_BY_FLASKDP];
    type_filter.extend(attributes.iter().map(String::as_str));
    let mut values = Vec::new();
    let mut names = Vec::new();
    for component in components {
        let Some(att) = component.as_attribute() else {
            continue;
        };
        if !att.type_is(&type_filter) {
            continue;
        }
        match att.value().parse::<f64>() {
            Ok(value) => {
                values.push(value);
                names.push(att.name().to_string());
            }
            Err(_) => {
                error!(
                    job,
                    value = att.value(),
                    attribute = att.name(),
                    "unable to parse attribute value as float"
                );
            }
        }
    }
    (values, names)
}

/// Builds the request items for one run.
fn prepare_items(
    job: &str,
    data: &Request,
    attributes: &[String],
    objects: &[String],
) -> Vec<PreparedItem> {
    let mut items = Vec::new();
    if !objects.is_empty() {
        let mut count = 0;
        for component in data.components() {
            if !object_matches(component, objects) {
                continue;
            }
            let Some(object) = component.as_object() else {
                continue;
            };
            let (values, names) = numeric_attributes(job, object.components(), attributes);
            items.push(PreparedItem {
                id: format!("obj{}-{}", object.name(), count),
                values,
                attribute_names: names,
                object_index: Some(count),
            });
            count += 1;
        }
    } else {
        for attribute_type in attributes {
            let selection: Vec<Component> = data
                .types_get(&[TYPE_ANONYMIZABLE_BY_FLASKDP])
                .into_iter()
                .cloned()
                .collect();
            let (values, names) = numeric_attributes(job, &selection, std::slice::from_ref(attribute_type));
            items.push(PreparedItem {
                id: attribute_type.clone(),
                values,
                attribute_names: names,
                object_index: None,
            });
        }
    }
    items
}

/// Writes noised values back over the attributes an item was built from.
fn write_item(
    job: &str,
    data: &mut Request,
    item: &PreparedItem,
    objects: &[String],
    values: &[f64],
) -> Result<(), PipelineError> {
    if values.len() != item.attribute_names.len() {
        return Err(PipelineError::JobFailed(format!(
            "FlaskDP response for item {} has {} values, expected {}",
            item.id,
            values.len(),
            item.attribute_names.len()
        )));
    }
    match item.object_index {
        Some(index) => {
            let mut count = 0;
            for component in data.components_mut().iter_mut() {
                if !object_matches(component, objects) {
                    continue;
                }
                if count == index {
                    let Some(object) = component.as_object_mut() else {
                        continue;
                    };
                    for (name, value) in item.attribute_names.iter().zip(values) {
                        if let Some(att) = object
                            .components_mut()
                            .iter_mut()
                            .filter_map(Component::as_attribute_mut)
                            .find(|a| a.name() == name)
                        {
                            debug!(job, old = att.value(), new = value, "updating value");
                            att.set_value(value.to_string());
                        }
                    }
                    return Ok(());
                }
                count += 1;
            }
            Err(PipelineError::JobFailed(format!(
                "FlaskDP response item {} no longer matches the request",
                item.id
            )))
        }
        None => {
            for (name, value) in item.attribute_names.iter().zip(values) {
                if let Some(att) = data
                    .components_mut()
                    .iter_mut()
                    .filter_map(Component::as_attribute_mut)
                    .find(|a| a.name() == name)
                {
                    debug!(job, old = att.value(), new = value, "updating value");
                    att.set_value(value.to_string());
                }
            }
            Ok(())
        }
    }
}

/// The shared body of every FlaskDP job.
async fn apply_mechanism(ctx: &mut JobContext<'_>, mechanism: Mechanism) -> Result<(), PipelineError> {
    let attributes = ctx.arg_string_list(PARAM_ATTRIBUTES)?;
    let objects = ctx.arg_string_list(PARAM_OBJECTS)?;
    let parameters = DpParameters {
        epsilon: ctx.arg_f64(PARAM_EPSILON)?,
        delta: ctx.arg(PARAM_DELTA).and_then(Value::as_f64).unwrap_or(0.0),
        sensitivity: ctx.arg_f64(PARAM_SENSITIVITY)?,
        upper: ctx.arg(PARAM_UPPER).and_then(Value::as_f64).unwrap_or(1.0),
        lower: ctx.arg(PARAM_LOWER).and_then(Value::as_f64).unwrap_or(0.0),
        mechanism,
    };
    let url = flaskdp_url(ctx)?;

    let items = prepare_items(ctx.name, ctx.data()?, &attributes, &objects);
    let request = FlaskDpRequest {
        items: items
            .iter()
            .map(|item| ItemRequest {
                id: item.id.clone(),
                values: item.values.clone(),
                epsilon: parameters.epsilon,
                delta: parameters.delta,
                sensitivity: parameters.sensitivity,
                mechanism: parameters.mechanism,
                upper: parameters.upper,
                lower: parameters.lower,
            })
            .collect(),
    };

    let connection = ctx
        .env
        .services()
        .settings
        .snapshot()
        .services
        .flaskdp
        .map(|s| s.connection)
        .unwrap_or_default();
    let client = FlaskDpClient::new(&url, connection)
        .map_err(|e| PipelineError::JobFailed(format!("Client exception raised: {}", e)))?;
    let response = client
        .apply_dp(&request)
        .await?
        .ok_or_else(|| PipelineError::JobFailed("FlaskDP request failed".into()))?;

    for item_response in &response.items {
        let Some(item) = items.iter().find(|i| i.id == item_response.id) else {
            return Err(PipelineError::JobFailed(format!(
                "FlaskDP response contains unknown item {}",
                item_response.id
            )));
        };
        write_item(ctx.name, ctx.data_mut()?, item, &objects, &item_response.values)?;
    }
    Ok(())
}

/// Apply differential privacy with the technique given as a parameter.
///
/// Required parameters: `technique`, `attributes`, `epsilon`, `delta`,
/// `sensitivity`. Optional: `upper`, `lower`, `objects`, `flaskdp_url`.
pub struct FromTechnique;

#[async_trait]
impl Job for FromTechnique {
    async fn execute(&self, ctx: &mut JobContext<'_>) -> Result<JobOutput, PipelineError> {
        ctx.verify_parameters(&[
            PARAM_TECHNIQUE,
            PARAM_ATTRIBUTES,
            PARAM_EPSILON,
            PARAM_DELTA,
            PARAM_SENSITIVITY,
        ])?;
        let mechanism = Mechanism::from_scheme(ctx.arg_str(PARAM_TECHNIQUE)?);
        apply_mechanism(ctx, mechanism).await?;
        Ok(JobOutput::None)
    }
}

macro_rules! fixed_mechanism_job {
    ($(#[$doc:meta])* $name:ident, $mechanism:expr, [$($param:ident),+]) => {
        $(#[$doc])*
        pub struct $name;

        #[async_trait]
        impl Job for $name {
            async fn execute(&self, ctx: &mut JobContext<'_>) -> Result<JobOutput, PipelineError> {
                ctx.verify_parameters(&[$($param),+])?;
                apply_mechanism(ctx, $mechanism).await?;
                Ok(JobOutput::None)
            }
        }
    };
}

fixed_mechanism_job!(
    /// Apply differential privacy (Laplace).
    Laplace,
    Mechanism::Laplace,
    [PARAM_ATTRIBUTES, PARAM_EPSILON, PARAM_DELTA, PARAM_SENSITIVITY]
);

fixed_mechanism_job!(
    /// Apply differential privacy (truncated Laplace); requires bounds.
    LaplaceTruncated,
    Mechanism::LaplaceTruncated,
    [PARAM_ATTRIBUTES, PARAM_EPSILON, PARAM_DELTA, PARAM_SENSITIVITY, PARAM_UPPER, PARAM_LOWER]
);

fixed_mechanism_job!(
    /// Apply differential privacy (Laplace with bounded domain); requires
    /// bounds.
    LaplaceBoundedDomain,
    Mechanism::LaplaceBoundedDomain,
    [PARAM_ATTRIBUTES, PARAM_EPSILON, PARAM_DELTA, PARAM_SENSITIVITY, PARAM_UPPER, PARAM_LOWER]
);

fixed_mechanism_job!(
    /// Apply differential privacy (Laplace with bounded noise).
    LaplaceBoundedNoise,
    Mechanism::LaplaceBoundedNoise,
    [PARAM_ATTRIBUTES, PARAM_EPSILON, PARAM_DELTA, PARAM_SENSITIVITY]
);

fixed_mechanism_job!(
    /// Apply differential privacy (Gaussian distribution).
    Gaussian,
    Mechanism::Gaussian,
    [PARAM_ATTRIBUTES, PARAM_EPSILON, PARAM_DELTA, PARAM_SENSITIVITY]
);

fixed_mechanism_job!(
    /// Apply differential privacy (analytical Gaussian mechanism).
    GaussianAnalytic,
    Mechanism::GaussianAnalytic,
    [PARAM_ATTRIBUTES, PARAM_EPSILON, PARAM_DELTA, PARAM_SENSITIVITY]
);

/// Anonymize using a privacy policy.
///
/// Walks the privacy policy and emits one [`FromTechnique`] per DP-flagged
/// attribute policy and per DP-flagged object template (scoped to the
/// template's attribute names, or all attributes when `apply-to-all` is
/// set). Jobs cannot be grouped by technique because metadata may differ.
///
/// Required parameters:
///
/// - `privacy_policy_location` (`str`)
///
/// Optional parameters:
///
/// - `flaskdp_url` (`str`): alternative service URL.
pub struct FromPrivacyPolicy;

#[async_trait]
impl Job for FromPrivacyPolicy {
    async fn execute(&self, ctx: &mut JobContext<'_>) -> Result<JobOutput, PipelineError> {
        ctx.verify_parameters(&[PARAM_PRIVACY_POLICY_LOCATION])?;
        let url = flaskdp_url(ctx)?;
        let privacy: PrivacyPolicy = ctx.model_from_env(ctx.arg_str(PARAM_PRIVACY_POLICY_LOCATION)?)?;

        let mut generated: Vec<GeneratedJob> = Vec::new();

        for att_policy in &privacy.attributes {
            if !att_policy.dp {
                continue;
            }
            let dp_policy = att_policy.dp_policy.as_ref().ok_or_else(|| {
                PipelineError::JobFailed(format!("Missing DP policy for attribute \"{}\"", att_policy.name))
            })?;
            let args = serde_json::json!({
                "attributes": [att_policy.name],
                "technique": dp_policy.scheme,
                "epsilon": dp_policy.metadata.epsilon,
                "delta": dp_policy.metadata.delta,
                "sensitivity": dp_policy.metadata.sensitivity,
                "upper": dp_policy.metadata.upper,
                "lower": dp_policy.metadata.lower,
                "flaskdp_url": url,
            });
            generated.push(GeneratedJob::new(
                format!("{}_attribute", generated.len()),
                Box::new(FromTechnique),
                args.as_object().cloned().unwrap_or_default(),
            ));
        }

        for template in &privacy.templates {
            if !template.dp {
                continue;
            }
            let dp_policy = template.dp_policy.as_ref().ok_or_else(|| {
                PipelineError::JobFailed(format!("Missing DP policy for object \"{}\"", template.name))
            })?;
            let attributes: Vec<String> = if dp_policy.apply_to_all {
                Vec::new()
            } else {
                dp_policy.attribute_names.clone()
            };
            let args = serde_json::json!({
                "attributes": attributes,
                "technique": dp_policy.scheme,
                "objects": [template.name],
                "epsilon": dp_policy.metadata.epsilon,
                "delta": dp_policy.metadata.delta,
                "sensitivity": dp_policy.metadata.sensitivity,
                "upper": dp_policy.metadata.upper,
                "lower": dp_policy.metadata.lower,
                "flaskdp_url": url,
            });
            generated.push(GeneratedJob::new(
                format!("{}_object", generated.len()),
                Box::new(FromTechnique),
                args.as_object().cloned().unwrap_or_default(),
            ));
        }
        info!(job = ctx.name, count = generated.len(), "DP jobs synthesized");
        Ok(JobOutput::Generated(generated))
    }

    fn is_generator(&self) -> bool {
        true
    }
}
