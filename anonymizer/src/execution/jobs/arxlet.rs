// /////////////////////////////////////////////////////////////////////////////
// Privacy-Preserving Pipeline Orchestrator
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # ARXlet Jobs (Statistical Disclosure Control)
//!
//! Jobs targeting the ARXlet service: k-anonymity, k-map, the l-diversity
//! family and t-closeness. Only components tagged `arxlet:anonymizable`
//! are eligible.
//!
//! [`FromPets`] is the workhorse: it prepares attribute values (with their
//! generalization ladders) and pruned object records, posts them to the
//! service together with the PET batch, and overwrites the values in
//! place with the generalized response. The scheme-specific jobs
//! ([`KAnonymity`], [`DistinctLDiversity`], ..., [`KMap`]) synthesize a
//! single PET descriptor and delegate to it.
//!
//! [`FromPrivacyPolicy`] is the generator that turns the declarative
//! privacy policy into this job stream: one `FromPets` carrying the global
//! PET batch, plus one `KMap` per object template marked `k-map`. A
//! template marked `k-map` contributes only its k-map job; other PETs
//! declared on its attributes are not added to the global batch. For a
//! template marked `k-anonymity`, k-anonymity enters the batch once even
//! if several of its attributes request it.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info};

use anonymizer_domain::entities::{Component, ComponentContainer, Object, Request};
use anonymizer_domain::policies::{
    hierarchy_values, HierarchyAttribute, HierarchyObject, HierarchyPolicy, PrivacyPolicy,
};
use anonymizer_domain::PipelineError;

use crate::execution::job::{GeneratedJob, Job, JobContext, JobOutput};
use crate::infrastructure::clients::arxlet::ArxletClient;
use crate::models::arxlet::{
    pet_from_scheme, AttributeData, ObjectData, Pet, PetMetadata, PetSchemeError, SCHEME_DLDIV,
    SCHEME_ELDIV, SCHEME_HTCLO, SCHEME_KANON, SCHEME_KMAP, SCHEME_OTCLO, SCHEME_RLDIV,
};

/// Marks a component as a candidate for the ARXlet backend.
pub const TYPE_ANONYMIZABLE_BY_ARXLET: &str = "arxlet:anonymizable";

const PARAM_ARXLET_URL: &str = "arxlet_url";
const PARAM_PETS: &str = "pets";
const PARAM_ATTRIBUTES: &str = "attributes";
const PARAM_OBJECTS: &str = "objects";
const PARAM_ATTRIBUTE_HIERARCHIES: &str = "attribute_hierarchies";
const PARAM_OBJECT_HIERARCHIES: &str = "object_hierarchies";
const PARAM_K: &str = "k";
const PARAM_L: &str = "l";
const PARAM_C: &str = "c";
const PARAM_T: &str = "t";
const PARAM_SENSITIVE: &str = "sensitive";
const PARAM_OBJECT: &str = "object";
const PARAM_OBJECT_HIERARCHY: &str = "object_hierarchy";
const PARAM_PRIVACY_POLICY_LOCATION: &str = "privacy_policy_location";
const PARAM_HIERARCHY_POLICY_LOCATION: &str = "hierarchy_policy_location";

/// An object target: the template type and its quasi-identifying /
/// sensitive attribute types.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectSpec {
    #[serde(rename = "type")]
    pub object_type: String,
    pub values: Vec<String>,
}

/// The ARXlet base URL: per-job override or the configured service.
fn arxlet_url(ctx: &JobContext<'_>) -> Result<String, PipelineError> {
    if let Some(url) = ctx.arg(PARAM_ARXLET_URL).and_then(Value::as_str) {
        return Ok(url.to_string());
    }
    ctx.env
        .services()
        .settings
        .snapshot()
        .services
        .arxlet
        .map(|s| s.url)
        .ok_or_else(|| PipelineError::JobFailed("ARXlet service not configured".into()))
}

/// Builds the client for a job call.
fn client(ctx: &JobContext<'_>, url: &str) -> Result<ArxletClient, PipelineError> {
    let connection = ctx
        .env
        .services()
        .settings
        .snapshot()
        .services
        .arxlet
        .map(|s| s.connection)
        .unwrap_or_default();
    ArxletClient::new(url, connection).map_err(|e| PipelineError::JobFailed(format!("Client exception raised: {}", e)))
}

/// Transforms attribute values into ARXlet data with their ladders.
fn prepare_attributes(values: &[String], hierarchy: &HierarchyAttribute) -> Result<Vec<AttributeData>, PipelineError> {
    values
        .iter()
        .map(|value| {
            Ok(AttributeData {
                value: value.clone(),
                hierarchies: hierarchy_values(value, hierarchy)?,
            })
        })
        .collect()
}

/// Transforms one object into an ARXlet record, in `names` column order.
///
/// Only the named (sensitive/quasi-identifying) attributes survive; the
/// rest of the object is pruned from the record.
fn prepare_object_data(
    object: &Object,
    hierarchy: &HierarchyObject,
    names: &[String],
) -> Result<ObjectData, PipelineError> {
    let mut values = Vec::with_capacity(names.len());
    let mut hierarchies = Vec::with_capacity(names.len());
    for name in names {
        let att_hierarchy = hierarchy
            .attribute_hierarchy(name)
            .ok_or_else(|| PipelineError::JobFailed(format!("No hierarchy for attribute \"{}\"", name)))?;
        let attribute = object
            .components()
            .iter()
            .filter_map(Component::as_attribute)
            .find(|a| a.type_is(&[name.as_str()]))
            .ok_or_else(|| {
                PipelineError::JobFailed(format!(
                    "Object \"{}\" lacks an attribute of type \"{}\"",
                    object.name(),
                    name
                ))
            })?;
        values.push(crate::models::arxlet::Attribute {
            attribute_type: name.clone(),
            value: attribute.value().to_string(),
        });
        hierarchies.push(crate::models::arxlet::Hierarchy {
            attribute_type: name.clone(),
            values: hierarchy_values(attribute.value(), att_hierarchy)?,
        });
    }
    Ok(ObjectData { values, hierarchies })
}

/// Top-level eligible attribute values of one attribute type, in order.
fn collect_attribute_values(data: &Request, attribute_type: &str) -> Vec<String> {
    data.types_get(&[TYPE_ANONYMIZABLE_BY_ARXLET])
        .into_iter()
        .filter_map(Component::as_attribute)
        .filter(|a| a.type_is(&[attribute_type]))
        .map(|a| a.value().to_string())
        .collect()
}

/// Writes generalized values back over the same selection, in order.
fn write_attribute_values(data: &mut Request, attribute_type: &str, values: &[String]) -> Result<(), PipelineError> {
    let mut replacement = values.iter();
    for component in data.components_mut().iter_mut() {
        if !component.type_is(&[TYPE_ANONYMIZABLE_BY_ARXLET]) {
            continue;
        }
        if let Some(att) = component.as_attribute_mut() {
            if att.type_is(&[attribute_type]) {
                let value = replacement
                    .next()
                    .ok_or_else(|| PipelineError::JobFailed("ARXlet response shorter than request".into()))?;
                att.set_value(value.clone());
            }
        }
    }
    if replacement.next().is_some() {
        return Err(PipelineError::JobFailed("ARXlet response longer than request".into()));
    }
    Ok(())
}

/// Top-level eligible objects of one template type, in order.
fn collect_objects<'a>(data: &'a Request, object_type: &str) -> Vec<&'a Object> {
    data.types_get(&[TYPE_ANONYMIZABLE_BY_ARXLET])
        .into_iter()
        .filter_map(Component::as_object)
        .filter(|o| o.type_is(&[object_type]))
        .collect()
}

/// Writes generalized records back into the matching objects, in order.
fn write_object_values(
    data: &mut Request,
    object_type: &str,
    responses: &[Vec<crate::models::arxlet::Attribute>],
) -> Result<(), PipelineError> {
    let mut response_iter = responses.iter();
    for component in data.components_mut().iter_mut() {
        if !component.type_is(&[TYPE_ANONYMIZABLE_BY_ARXLET]) {
            continue;
        }
        let Some(object) = component.as_object_mut() else {
            continue;
        };
        if !object.type_is(&[object_type]) {
            continue;
        }
        let response = response_iter
            .next()
            .ok_or_else(|| PipelineError::JobFailed("ARXlet response shorter than request".into()))?;
        for generalized in response {
            if let Some(att) = object
                .components_mut()
                .iter_mut()
                .filter_map(Component::as_attribute_mut)
                .find(|a| a.type_is(&[TYPE_ANONYMIZABLE_BY_ARXLET, generalized.attribute_type.as_str()]))
            {
                att.set_value(generalized.value.clone());
            }
        }
    }
    if response_iter.next().is_some() {
        return Err(PipelineError::JobFailed("ARXlet response longer than request".into()));
    }
    Ok(())
}

/// Parses one entry of the `pets` argument (instance, dict or JSON
/// string); `None` marks a scheme foreign to this backend.
fn parse_pet(job: &str, value: &Value) -> Result<Option<Pet>, PipelineError> {
    let resolved: Value = match value {
        Value::String(s) => serde_json::from_str(s)
            .map_err(|e| PipelineError::JobFailed(format!("Pet string is not valid JSON: {}", e)))?,
        other => other.clone(),
    };
    let object = resolved
        .as_object()
        .ok_or_else(|| PipelineError::JobFailed("Pet is not a string, dict or Pet instance".into()))?;
    let scheme = object
        .get("scheme")
        .and_then(Value::as_str)
        .ok_or_else(|| PipelineError::JobFailed("Pet lacks a scheme".into()))?;
    let metadata = object
        .get("metadata")
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();
    match pet_from_scheme(scheme, &metadata, None, None) {
        Ok(pet) => Ok(Some(pet)),
        Err(PetSchemeError::Unknown(scheme)) => {
            info!(job, scheme = %scheme, "unknown ARXlet PET scheme, skipping");
            Ok(None)
        }
        Err(PetSchemeError::Invalid(msg)) => Err(PipelineError::JobFailed(msg)),
    }
}

/// Anonymize based on a collection of PETs.
///
/// Required parameters:
///
/// - `pets` (`list`): PET descriptors (instances, dicts or JSON strings);
///   schemes foreign to this backend are skipped.
/// - `attributes` (`list[str]`): attribute types to anonymize (may be
///   empty).
/// - `objects` (`list`): object targets, each `{type, values}`.
/// - `attribute_hierarchies` (`list`): one hierarchy per entry of
///   `attributes`.
/// - `object_hierarchies` (`list`): one hierarchy per entry of `objects`.
///
/// Optional parameters:
///
/// - `arxlet_url` (`str`): alternative service URL.
pub struct FromPets;

impl FromPets {
    /// The delegation target shared with the scheme-specific jobs.
    pub(crate) async fn run_with(ctx: &mut JobContext<'_>) -> Result<(), PipelineError> {
        ctx.verify_parameters(&[
            PARAM_PETS,
            PARAM_ATTRIBUTES,
            PARAM_OBJECTS,
            PARAM_ATTRIBUTE_HIERARCHIES,
            PARAM_OBJECT_HIERARCHIES,
        ])?;
        let url = arxlet_url(ctx)?;

        // Extract the PET batch.
        let pets_arg = ctx
            .arg(PARAM_PETS)
            .and_then(Value::as_array)
            .cloned()
            .ok_or_else(|| PipelineError::JobFailed("Parameter pets is not a list".into()))?;
        let mut pets: Vec<Pet> = Vec::new();
        for entry in &pets_arg {
            if let Some(pet) = parse_pet(ctx.name, entry)? {
                pets.push(pet);
            }
        }
        debug!(job = ctx.name, count = pets.len(), "prepared PETs");
        if pets.is_empty() {
            info!(job = ctx.name, "no PETs to apply");
            return Ok(());
        }

        let attributes = ctx.arg_string_list(PARAM_ATTRIBUTES)?;
        let object_specs: Vec<ObjectSpec> = ctx
            .arg(PARAM_OBJECTS)
            .and_then(Value::as_array)
            .map(|entries| entries.iter().map(|e| ctx.parse_arg_as(e)).collect())
            .transpose()?
            .unwrap_or_default();
        let attribute_hierarchies = ctx
            .arg(PARAM_ATTRIBUTE_HIERARCHIES)
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        let object_hierarchies = ctx
            .arg(PARAM_OBJECT_HIERARCHIES)
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        // Apply the batch to each targeted attribute type.
        for attribute_type in &attributes {
            let mut hierarchy: Option<HierarchyAttribute> = None;
            for entry in &attribute_hierarchies {
                let parsed: HierarchyAttribute = ctx.parse_arg_as(entry)?;
                if parsed.attribute_name == *attribute_type {
                    hierarchy = Some(parsed);
                }
            }
            let hierarchy = hierarchy.ok_or_else(|| {
                PipelineError::JobFailed(format!("No hierarchy for attribute \"{}\"", attribute_type))
            })?;

            let values = collect_attribute_values(ctx.data()?, attribute_type);
            let prepared = prepare_attributes(&values, &hierarchy)?;
            debug!(job = ctx.name, count = prepared.len(), attribute = %attribute_type, "prepared attributes");
            if prepared.is_empty() {
                continue;
            }

            let response = client(ctx, &url)?
                .anonymize_attributes(&prepared, &pets)
                .await?
                .ok_or_else(|| PipelineError::JobFailed("ARXlet request failed".into()))?;
            write_attribute_values(ctx.data_mut()?, attribute_type, &response)?;
        }

        // Apply the batch to each targeted object template.
        for spec in &object_specs {
            let mut hierarchy: Option<HierarchyObject> = None;
            for entry in &object_hierarchies {
                let parsed: HierarchyObject = ctx.parse_arg_as(entry)?;
                if parsed.misp_object_template == spec.object_type {
                    hierarchy = Some(parsed);
                }
            }
            let hierarchy = hierarchy.ok_or_else(|| {
                PipelineError::JobFailed(format!("No hierarchy for object \"{}\"", spec.object_type))
            })?;

            let prepared: Vec<ObjectData> = collect_objects(ctx.data()?, &spec.object_type)
                .into_iter()
                .map(|o| prepare_object_data(o, &hierarchy, &spec.values))
                .collect::<Result<_, _>>()?;
            debug!(job = ctx.name, count = prepared.len(), object = %spec.object_type, "prepared objects");
            if prepared.is_empty() {
                continue;
            }

            let response = client(ctx, &url)?
                .anonymize_objects(&prepared, &pets)
                .await?
                .ok_or_else(|| PipelineError::JobFailed("ARXlet request failed".into()))?;
            write_object_values(ctx.data_mut()?, &spec.object_type, &response)?;
        }
        Ok(())
    }
}

#[async_trait]
impl Job for FromPets {
    async fn execute(&self, ctx: &mut JobContext<'_>) -> Result<JobOutput, PipelineError> {
        Self::run_with(ctx).await?;
        Ok(JobOutput::None)
    }
}

/// Delegates to [`FromPets`] with one synthesized PET prepended to the
/// caller's arguments (caller-supplied `pets` still win).
async fn delegate_with_pet(ctx: &mut JobContext<'_>, pet: Pet) -> Result<(), PipelineError> {
    let mut merged = Map::new();
    merged.insert(PARAM_PETS.into(), serde_json::json!([pet]));
    merged.insert(PARAM_ATTRIBUTES.into(), serde_json::json!([]));
    merged.insert(PARAM_OBJECTS.into(), serde_json::json!([]));
    merged.insert(PARAM_ATTRIBUTE_HIERARCHIES.into(), serde_json::json!([]));
    merged.insert(PARAM_OBJECT_HIERARCHIES.into(), serde_json::json!([]));
    for (key, value) in ctx.args {
        merged.insert(key.clone(), value.clone());
    }
    let mut inner = JobContext {
        name: ctx.name,
        env: &mut *ctx.env,
        args: &merged,
    };
    FromPets::run_with(&mut inner).await
}

/// Apply k-anonymity.
///
/// Required parameters: `k`, plus the [`FromPets`] target parameters.
pub struct KAnonymity;

#[async_trait]
impl Job for KAnonymity {
    async fn execute(&self, ctx: &mut JobContext<'_>) -> Result<JobOutput, PipelineError> {
        ctx.verify_parameters(&[PARAM_K])?;
        let pet = Pet {
            scheme: SCHEME_KANON.into(),
            metadata: PetMetadata::KAnonymity {
                k: ctx.arg_i64(PARAM_K)?,
            },
        };
        delegate_with_pet(ctx, pet).await?;
        Ok(JobOutput::None)
    }
}

macro_rules! sensitive_pet_job {
    ($(#[$doc:meta])* $name:ident, $build:expr) => {
        $(#[$doc])*
        pub struct $name;

        #[async_trait]
        impl Job for $name {
            async fn execute(&self, ctx: &mut JobContext<'_>) -> Result<JobOutput, PipelineError> {
                ctx.verify_parameters(&[PARAM_SENSITIVE])?;
                let sensitive = ctx.arg_str(PARAM_SENSITIVE)?.to_string();
                #[allow(clippy::redundant_closure_call)]
                let pet: Pet = ($build)(ctx, sensitive)?;
                delegate_with_pet(ctx, pet).await?;
                Ok(JobOutput::None)
            }
        }
    };
}

sensitive_pet_job!(
    /// Apply distinct l-diversity to a sensitive attribute.
    ///
    /// Required parameters: `l`, `sensitive`, plus the [`FromPets`] object
    /// target parameters.
    DistinctLDiversity,
    |ctx: &JobContext<'_>, sensitive: String| {
        ctx.verify_parameters(&[PARAM_L])?;
        Ok::<Pet, PipelineError>(Pet {
            scheme: SCHEME_DLDIV.into(),
            metadata: PetMetadata::LDiversity {
                attribute: sensitive,
                l: ctx.arg_i64(PARAM_L)?,
            },
        })
    }
);

sensitive_pet_job!(
    /// Apply entropy l-diversity to a sensitive attribute.
    ///
    /// Required parameters: `l`, `sensitive`, plus the [`FromPets`] object
    /// target parameters.
    EntropyLDiversity,
    |ctx: &JobContext<'_>, sensitive: String| {
        ctx.verify_parameters(&[PARAM_L])?;
        Ok::<Pet, PipelineError>(Pet {
            scheme: SCHEME_ELDIV.into(),
            metadata: PetMetadata::LDiversity {
                attribute: sensitive,
                l: ctx.arg_i64(PARAM_L)?,
            },
        })
    }
);

sensitive_pet_job!(
    /// Apply recursive (c, l)-diversity to a sensitive attribute.
    ///
    /// Required parameters: `l`, `c`, `sensitive`, plus the [`FromPets`]
    /// object target parameters.
    RecursiveCLDiversity,
    |ctx: &JobContext<'_>, sensitive: String| {
        ctx.verify_parameters(&[PARAM_L, PARAM_C])?;
        Ok::<Pet, PipelineError>(Pet {
            scheme: SCHEME_RLDIV.into(),
            metadata: PetMetadata::RecursiveLDiversity {
                attribute: sensitive,
                l: ctx.arg_i64(PARAM_L)?,
                c: ctx.arg_f64(PARAM_C)?,
            },
        })
    }
);

sensitive_pet_job!(
    /// Apply hierarchical-distance t-closeness to a sensitive attribute.
    ///
    /// Required parameters: `t`, `sensitive`, plus the [`FromPets`] object
    /// target parameters.
    HierarchicalTCloseness,
    |ctx: &JobContext<'_>, sensitive: String| {
        ctx.verify_parameters(&[PARAM_T])?;
        Ok::<Pet, PipelineError>(Pet {
            scheme: SCHEME_HTCLO.into(),
            metadata: PetMetadata::TCloseness {
                attribute: sensitive,
                t: ctx.arg_f64(PARAM_T)?,
            },
        })
    }
);

sensitive_pet_job!(
    /// Apply ordered-distance t-closeness to a sensitive attribute.
    ///
    /// Required parameters: `t`, `sensitive`, plus the [`FromPets`] object
    /// target parameters.
    OrderedTCloseness,
    |ctx: &JobContext<'_>, sensitive: String| {
        ctx.verify_parameters(&[PARAM_T])?;
        Ok::<Pet, PipelineError>(Pet {
            scheme: SCHEME_OTCLO.into(),
            metadata: PetMetadata::TCloseness {
                attribute: sensitive,
                t: ctx.arg_f64(PARAM_T)?,
            },
        })
    }
);

/// Apply k-map to anonymizable objects.
///
/// Retrieves previously-seen objects of the same template from the
/// context store as the re-identification population, then delegates to
/// [`FromPets`] with a single k-map descriptor.
///
/// Required parameters:
///
/// - `k` (`int`)
/// - `object` (`dict`): `{type, values}` object target.
/// - `object_hierarchy` (`dict`): the template's hierarchy.
///
/// Optional parameters:
///
/// - `arxlet_url` (`str`): alternative service URL.
pub struct KMap;

#[async_trait]
impl Job for KMap {
    async fn execute(&self, ctx: &mut JobContext<'_>) -> Result<JobOutput, PipelineError> {
        ctx.verify_parameters(&[PARAM_K, PARAM_OBJECT, PARAM_OBJECT_HIERARCHY])?;
        let k = ctx.arg_i64(PARAM_K)?;
        let spec: ObjectSpec = ctx.parse_arg_as(
            ctx.arg(PARAM_OBJECT)
                .ok_or_else(|| PipelineError::MissingParameter(PARAM_OBJECT.into()))?,
        )?;
        let hierarchy: HierarchyObject = ctx.parse_arg_as(
            ctx.arg(PARAM_OBJECT_HIERARCHY)
                .ok_or_else(|| PipelineError::MissingParameter(PARAM_OBJECT_HIERARCHY.into()))?,
        )?;
        let url = arxlet_url(ctx)?;

        // Assemble the population from previously-seen requests.
        let store = ctx.env.services().context_store.clone();
        let results = store
            .lookup(&[spec.object_type.clone()], true, None, true)
            .await
            .map_err(|e| PipelineError::JobFailed(format!("Context store failure: {}", e)))?;
        let mut context: Vec<Vec<ObjectData>> = Vec::with_capacity(results.len());
        let mut count = 0;
        for request in &results {
            let prepared: Vec<ObjectData> = collect_objects(request, &spec.object_type)
                .into_iter()
                .map(|o| prepare_object_data(o, &hierarchy, &spec.values))
                .collect::<Result<_, _>>()?;
            count += prepared.len();
            context.push(prepared);
        }
        debug!(job = ctx.name, count, "obtained objects from context database");

        let pet = Pet {
            scheme: SCHEME_KMAP.into(),
            metadata: PetMetadata::KMap { k, context },
        };
        let mut merged = Map::new();
        merged.insert(PARAM_PETS.into(), serde_json::json!([pet]));
        merged.insert(PARAM_OBJECTS.into(), serde_json::json!([spec]));
        merged.insert(PARAM_OBJECT_HIERARCHIES.into(), serde_json::json!([hierarchy]));
        merged.insert(PARAM_ATTRIBUTES.into(), serde_json::json!([]));
        merged.insert(PARAM_ATTRIBUTE_HIERARCHIES.into(), serde_json::json!([]));
        merged.insert(PARAM_ARXLET_URL.into(), Value::String(url));
        let mut inner = JobContext {
            name: ctx.name,
            env: &mut *ctx.env,
            args: &merged,
        };
        FromPets::run_with(&mut inner).await?;
        Ok(JobOutput::None)
    }
}

/// Anonymize using a privacy policy.
///
/// Walks the privacy policy and emits the ARXlet job stream: one
/// [`FromPets`] with the global PET batch, plus one [`KMap`] per object
/// template marked `k-map`. Both policies must have been parsed into the
/// environment by an earlier job.
///
/// Required parameters:
///
/// - `privacy_policy_location` (`str`)
/// - `hierarchy_policy_location` (`str`)
///
/// Optional parameters:
///
/// - `arxlet_url` (`str`): alternative service URL.
pub struct FromPrivacyPolicy;

#[async_trait]
impl Job for FromPrivacyPolicy {
    async fn execute(&self, ctx: &mut JobContext<'_>) -> Result<JobOutput, PipelineError> {
        ctx.verify_parameters(&[PARAM_PRIVACY_POLICY_LOCATION, PARAM_HIERARCHY_POLICY_LOCATION])?;
        let url = arxlet_url(ctx)?;
        let privacy: PrivacyPolicy = ctx.model_from_env(ctx.arg_str(PARAM_PRIVACY_POLICY_LOCATION)?)?;
        let hierarchy: HierarchyPolicy = ctx.model_from_env(ctx.arg_str(PARAM_HIERARCHY_POLICY_LOCATION)?)?;

        let mut all_pets: Vec<Pet> = Vec::new();
        let mut attribute_list: Vec<String> = Vec::new();
        let mut object_list: Vec<ObjectSpec> = Vec::new();
        let mut k_map_targets: Vec<(ObjectSpec, i64, HierarchyObject)> = Vec::new();

        // Attribute-level PETs all enter the global batch.
        for att_policy in &privacy.attributes {
            for pet in &att_policy.pets {
                let metadata = serde_json::to_value(&pet.metadata)?
                    .as_object()
                    .cloned()
                    .unwrap_or_default();
                match pet_from_scheme(&pet.scheme, &metadata, Some(&att_policy.name), None) {
                    Ok(parsed) => all_pets.push(parsed),
                    Err(PetSchemeError::Unknown(scheme)) => {
                        info!(job = ctx.name, scheme = %scheme, "unknown ARXlet PET scheme, skipping");
                    }
                    Err(PetSchemeError::Invalid(msg)) => return Err(PipelineError::JobFailed(msg)),
                }
            }
            attribute_list.push(att_policy.name.clone());
        }

        // Template-level PETs: k-anonymity enters once per template; a
        // template marked k-map contributes only its KMap job.
        for template in &privacy.templates {
            let mut k_anon_count = 0;
            let mut sensitive: Vec<String> = Vec::new();
            let mut template_pets: Vec<Pet> = Vec::new();

            for att_policy in &template.attributes {
                for pet in &att_policy.pets {
                    let metadata = serde_json::to_value(&pet.metadata)?
                        .as_object()
                        .cloned()
                        .unwrap_or_default();
                    let parsed = match pet_from_scheme(&pet.scheme, &metadata, Some(&att_policy.name), None) {
                        Ok(parsed) => parsed,
                        Err(PetSchemeError::Unknown(scheme)) => {
                            info!(job = ctx.name, scheme = %scheme, "unknown ARXlet PET scheme, skipping");
                            continue;
                        }
                        Err(PetSchemeError::Invalid(msg)) => return Err(PipelineError::JobFailed(msg)),
                    };
                    if !sensitive.contains(&att_policy.name) {
                        sensitive.push(att_policy.name.clone());
                    }
                    if parsed.scheme.contains(SCHEME_KANON) {
                        k_anon_count += 1;
                        if k_anon_count > 1 {
                            continue;
                        }
                    }
                    template_pets.push(parsed);
                }
            }

            let spec = ObjectSpec {
                object_type: template.name.clone(),
                values: sensitive,
            };
            object_list.push(spec.clone());

            if template.k_map {
                let object_hierarchy = hierarchy.object_hierarchy(&template.name).cloned().ok_or_else(|| {
                    PipelineError::JobFailed(format!("No hierarchy for object \"{}\"", template.name))
                })?;
                k_map_targets.push((spec, template.k, object_hierarchy));
            } else {
                all_pets.extend(template_pets);
            }
        }

        let mut generated = Vec::new();
        let args = serde_json::json!({
            "pets": all_pets,
            "attributes": attribute_list,
            "objects": object_list,
            "attribute_hierarchies": hierarchy.hierarchy_attributes,
            "object_hierarchies": hierarchy.hierarchy_objects,
            "arxlet_url": url,
        });
        generated.push(GeneratedJob::new(
            "apply_pets",
            Box::new(FromPets),
            args.as_object().cloned().unwrap_or_default(),
        ));

        for (spec, k, object_hierarchy) in k_map_targets {
            let name = format!("apply_k_map_{}", spec.object_type);
            let args = serde_json::json!({
                "k": k,
                "object": spec,
                "object_hierarchy": object_hierarchy,
                "arxlet_url": url,
            });
            generated.push(GeneratedJob::new(
                name,
                Box::new(KMap),
                args.as_object().cloned().unwrap_or_default(),
            ));
        }

        Ok(JobOutput::Generated(generated))
    }

    fn is_generator(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::environment::{EnvValue, KEY_DATA};
    use crate::test_support::test_env;
    use anonymizer_domain::entities::Attribute;
    use anonymizer_domain::policies::{AttributeGeneralization, HIERARCHY_KIND_REGEX};
    use serde_json::json;
    use std::collections::BTreeSet;

    fn tagged_attribute(name: &str, semantic: &str, value: &str) -> Component {
        let types: BTreeSet<String> = ["attribute", TYPE_ANONYMIZABLE_BY_ARXLET, semantic]
            .iter()
            .map(|s| s.to_string())
            .collect();
        Component::Attribute(Attribute::with_types(name, types, value))
    }

    fn ip_hierarchy() -> HierarchyAttribute {
        HierarchyAttribute {
            attribute_name: "ip-src".into(),
            attribute_type: HIERARCHY_KIND_REGEX.into(),
            attribute_generalization: vec![AttributeGeneralization {
                regex: vec![r"\d+$".into()],
                ..Default::default()
            }],
        }
    }

    #[test]
    fn attribute_read_and_write_passes_align() {
        let mut request = Request::new(
            BTreeSet::new(),
            vec![
                tagged_attribute("a", "ip-src", "10.0.0.1"),
                tagged_attribute("b", "ip-dst", "10.0.0.2"),
                tagged_attribute("c", "ip-src", "10.0.0.3"),
            ],
        );
        let values = collect_attribute_values(&request, "ip-src");
        assert_eq!(values, vec!["10.0.0.1", "10.0.0.3"]);

        write_attribute_values(&mut request, "ip-src", &["x".into(), "y".into()]).unwrap();
        assert_eq!(collect_attribute_values(&request, "ip-src"), vec!["x", "y"]);
        // Untargeted types were left alone.
        assert_eq!(collect_attribute_values(&request, "ip-dst"), vec!["10.0.0.2"]);

        assert!(write_attribute_values(&mut request, "ip-src", &["only-one".into()]).is_err());
    }

    #[test]
    fn object_preparation_prunes_to_named_columns() {
        let types: BTreeSet<String> = ["object", TYPE_ANONYMIZABLE_BY_ARXLET, "network-flow"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let object = Object::with_types(
            "flow-1",
            types,
            vec![
                tagged_attribute("a", "ip-src", "10.0.0.1"),
                tagged_attribute("b", "comment", "not sensitive"),
            ],
        );
        let hierarchy = HierarchyObject {
            misp_object_template: "network-flow".into(),
            attribute_hierarchies: vec![ip_hierarchy()],
        };
        let data = prepare_object_data(&object, &hierarchy, &["ip-src".into()]).unwrap();
        assert_eq!(data.values.len(), 1);
        assert_eq!(data.values[0].value, "10.0.0.1");
        assert_eq!(data.hierarchies[0].values, vec!["10.0.0.1", "10.0.0.*"]);
    }

    #[tokio::test]
    async fn policy_walk_emits_from_pets_then_kmap_jobs() {
        let mut env = test_env();
        let privacy = json!({
            "creator": "c", "organization": "o", "version": "1",
            "attributes": [
                {"name": "ip-src", "type": "ip", "dp": false,
                 "pets": [{"scheme": "k-anonymity", "metadata": {"k": 3}},
                           {"scheme": "suppression", "metadata": {"level": 1}}]}
            ],
            "templates": [
                {
                    "name": "network-flow", "k-anonymity": true, "k-map": false,
                    "k": 5, "dp": false,
                    "attributes": [
                        {"name": "ip-src", "type": "ip",
                         "pets": [{"scheme": "k-anonymity", "metadata": {"k": 5}}]},
                        {"name": "ip-dst", "type": "ip",
                         "pets": [{"scheme": "k-anonymity", "metadata": {"k": 5}}]}
                    ]
                },
                {
                    "name": "person", "k-anonymity": false, "k-map": true,
                    "k": 7, "dp": false,
                    "attributes": [
                        {"name": "full-name", "type": "text",
                         "pets": [{"scheme": "k-anonymity", "metadata": {"k": 2}}]}
                    ]
                }
            ]
        });
        let hierarchy = json!({
            "creator": "c", "organization": "o", "version": "1",
            "hierarchy_attributes": [ip_hierarchy()],
            "hierarchy_objects": [
                {"misp-object-template": "person",
                 "attribute-hierarchies": [
                     {"attribute-name": "full-name", "attribute-type": "regex",
                      "attribute-generalization": [{"generalization": [], "interval": [], "regex": [".*"]}]}
                 ]}
            ]
        });
        env.set_model("privacy", privacy);
        env.set_model("hierarchy", hierarchy);

        let args = json!({
            "privacy_policy_location": "privacy",
            "hierarchy_policy_location": "hierarchy",
            "arxlet_url": "http://arxlet.test/",
        })
        .as_object()
        .cloned()
        .unwrap();
        let mut ctx = JobContext {
            name: "arxlet-policy",
            env: &mut env,
            args: &args,
        };

        match FromPrivacyPolicy.execute(&mut ctx).await.unwrap() {
            JobOutput::Generated(children) => {
                let names: Vec<&str> = children.iter().map(|c| c.name.as_str()).collect();
                assert_eq!(names, vec!["apply_pets", "apply_k_map_person"]);

                let pets = children[0].args["pets"].as_array().unwrap();
                // One from the attribute policy, one k-anonymity from the
                // non-k-map template (deduplicated); the local scheme was
                // skipped and the k-map template's PETs were swallowed.
                assert_eq!(pets.len(), 2);
                assert!(pets.iter().all(|p| p["scheme"] == "k-anonymity"));

                let objects = children[0].args["objects"].as_array().unwrap();
                assert_eq!(objects.len(), 2);
                assert_eq!(objects[0]["type"], "network-flow");
                assert_eq!(objects[0]["values"], json!(["ip-src", "ip-dst"]));

                assert_eq!(children[1].args["k"], 7);
                assert_eq!(children[1].args["object"]["type"], "person");
            }
            _ => panic!("expected generated jobs"),
        }
    }

    #[tokio::test]
    async fn from_pets_with_no_applicable_pets_is_a_successful_noop() {
        let mut env = test_env();
        env.set(KEY_DATA, EnvValue::Data(Request::default()));
        let args = json!({
            "pets": [{"scheme": "laplace", "metadata": {}}],
            "attributes": [], "objects": [],
            "attribute_hierarchies": [], "object_hierarchies": [],
            "arxlet_url": "http://arxlet.test/",
        })
        .as_object()
        .cloned()
        .unwrap();
        let mut ctx = JobContext {
            name: "apply_pets",
            env: &mut env,
            args: &args,
        };
        assert!(FromPets.execute(&mut ctx).await.is_ok());
    }
}
