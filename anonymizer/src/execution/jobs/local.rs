// /////////////////////////////////////////////////////////////////////////////
// Privacy-Preserving Pipeline Orchestrator
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Local Anonymization Jobs
//!
//! The one backend that runs in-process: suppression/generalization by
//! hierarchy-ladder substitution, and PGP encryption of attribute values.
//! Only components tagged `local:anonymizable` are eligible.
//!
//! Targets are selected the same way for both jobs: when the `objects`
//! parameter is empty, top-level attributes are treated; otherwise the
//! attributes *inside* top-level objects carrying any of the listed object
//! types are treated. Within the selection, only attributes matching one
//! of the `attributes` type names are touched.

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use pgp::composed::{Deserializable, Message, SignedPublicKey};
use pgp::crypto::sym::SymmetricKeyAlgorithm;
use serde_json::Value;
use tracing::{debug, info};

use anonymizer_domain::entities::{Attribute, Component, ComponentContainer};
use anonymizer_domain::policies::{hierarchy_values, HierarchyAttribute, HierarchyPolicy, Pet, PrivacyPolicy};
use anonymizer_domain::PipelineError;

use crate::execution::job::{GeneratedJob, Job, JobContext, JobOutput};

/// Marks a component as a candidate for the local backend.
pub const TYPE_ANONYMIZABLE_BY_LOCAL: &str = "local:anonymizable";

/// The PET schemes the local backend understands.
pub const KNOWN_PETS: [&str; 3] = ["suppression", "generalization", "pgp"];

const PARAM_LEVEL: &str = "level";
const PARAM_KEY: &str = "key";
const PARAM_PETS: &str = "pets";
const PARAM_ATTRIBUTES: &str = "attributes";
const PARAM_OBJECTS: &str = "objects";
const PARAM_ATTRIBUTE_HIERARCHIES: &str = "attribute_hierarchies";
const PARAM_OBJECT_HIERARCHIES: &str = "object_hierarchies";
const PARAM_PRIVACY_POLICY_LOCATION: &str = "privacy_policy_location";
const PARAM_HIERARCHY_POLICY_LOCATION: &str = "hierarchy_policy_location";

/// Runs `treat` over every eligible target attribute, in place.
fn for_each_target<F>(
    ctx: &mut JobContext<'_>,
    objects: &[String],
    mut treat: F,
) -> Result<usize, PipelineError>
where
    F: FnMut(&mut Attribute) -> Result<(), PipelineError>,
{
    let mut count = 0;
    let data = ctx.data_mut()?;
    for component in data.components_mut().iter_mut() {
        if !component.type_is(&[TYPE_ANONYMIZABLE_BY_LOCAL]) {
            continue;
        }
        match component {
            Component::Attribute(att) if objects.is_empty() => {
                count += 1;
                treat(att)?;
            }
            Component::Object(obj) if !objects.is_empty() => {
                if !objects.iter().any(|t| obj.type_is(&[t.as_str()])) {
                    continue;
                }
                for child in obj.components_mut().iter_mut() {
                    if let Component::Attribute(att) = child {
                        count += 1;
                        treat(att)?;
                    }
                }
            }
            _ => {}
        }
    }
    Ok(count)
}

/// The first entry of `attributes` the attribute's type set satisfies.
fn matching_type<'a>(att: &Attribute, attributes: &'a [String]) -> Option<&'a String> {
    attributes.iter().find(|n| att.type_is(&[n.as_str()]))
}

/// Applies a certain anonymization level to attributes.
///
/// Required parameters:
///
/// - `level` (`int`): the suppression level into the hierarchy ladder.
/// - `attributes` (`list[str]`): attribute types to anonymize.
/// - `objects` (`list[str]`): top-level object types to look up attributes
///   in; empty treats only top-level attributes.
/// - `attribute_hierarchies` (`list`): one hierarchy description per entry
///   of `attributes`.
pub struct ApplyAnonymizationLevel;

#[async_trait]
impl Job for ApplyAnonymizationLevel {
    async fn execute(&self, ctx: &mut JobContext<'_>) -> Result<JobOutput, PipelineError> {
        ctx.verify_parameters(&[PARAM_LEVEL, PARAM_ATTRIBUTES, PARAM_OBJECTS, PARAM_ATTRIBUTE_HIERARCHIES])?;
        let level = ctx.arg_i64(PARAM_LEVEL)?;
        if level < 0 {
            return Err(PipelineError::JobFailed("Anonymization level must not be negative".into()));
        }
        let level = level as usize;
        let attributes = ctx.arg_string_list(PARAM_ATTRIBUTES)?;
        let objects = ctx.arg_string_list(PARAM_OBJECTS)?;

        debug!(job = ctx.name, ?attributes, "applying suppression");
        debug!(job = ctx.name, ?objects, "objects to look inside of");

        let mut hierarchy_map: HashMap<String, HierarchyAttribute> = HashMap::new();
        if let Some(entries) = ctx.arg(PARAM_ATTRIBUTE_HIERARCHIES).and_then(Value::as_array) {
            for entry in entries {
                let parsed: HierarchyAttribute = ctx.parse_arg_as(entry)?;
                hierarchy_map.insert(parsed.attribute_name.clone(), parsed);
            }
        }

        let treated = for_each_target(ctx, &objects, |att| {
            let Some(name) = matching_type(att, &attributes) else {
                return Ok(());
            };
            let hierarchy = hierarchy_map
                .get(name)
                .ok_or_else(|| PipelineError::JobFailed(format!("No hierarchy for attribute \"{}\"", name)))?;
            let values = hierarchy_values(att.value(), hierarchy)?;
            if values.len() <= level {
                debug!(
                    expected = level + 1,
                    found = values.len(),
                    "not enough generalization levels"
                );
                return Err(PipelineError::JobFailed(format!(
                    "Not enough generalization levels for attribute {}",
                    att.name()
                )));
            }
            att.set_value(values[level].clone());
            Ok(())
        })?;
        debug!(job = ctx.name, treated, "lookup list treated");
        Ok(JobOutput::None)
    }
}

/// Encrypt a collection of attributes using PGP.
///
/// Required parameters:
///
/// - `key` (`str`): filename of the armored public key inside the PGP
///   resource directory.
/// - `attributes` (`list[str]`): attribute types to encrypt.
/// - `objects` (`list[str]`): top-level object types to look up attributes
///   in; empty treats only top-level attributes.
pub struct ApplyPgpEncryption;

impl ApplyPgpEncryption {
    fn retrieve_key(path: &Path) -> Result<SignedPublicKey, PipelineError> {
        let file = std::fs::File::open(path)
            .map_err(|e| PipelineError::JobFailed(format!("Unable to read PGP key {}: {}", path.display(), e)))?;
        let (key, _headers) = SignedPublicKey::from_armor_single(file)
            .map_err(|e| PipelineError::JobFailed(format!("Not an armored PGP public key: {}", e)))?;
        Ok(key)
    }

    fn encrypt(value: &str, key: &SignedPublicKey) -> Result<String, PipelineError> {
        let message = Message::new_literal("", value);
        let mut rng = rand::thread_rng();
        let encrypted = message
            .encrypt_to_keys(&mut rng, SymmetricKeyAlgorithm::AES256, &[key])
            .map_err(|e| PipelineError::JobFailed(format!("PGP encryption failed: {}", e)))?;
        encrypted
            .to_armored_string(None)
            .map_err(|e| PipelineError::JobFailed(format!("PGP armoring failed: {}", e)))
    }
}

#[async_trait]
impl Job for ApplyPgpEncryption {
    async fn execute(&self, ctx: &mut JobContext<'_>) -> Result<JobOutput, PipelineError> {
        ctx.verify_parameters(&[PARAM_KEY, PARAM_ATTRIBUTES, PARAM_OBJECTS])?;
        let key_name = ctx.arg_str(PARAM_KEY)?.to_string();
        let attributes = ctx.arg_string_list(PARAM_ATTRIBUTES)?;
        let objects = ctx.arg_string_list(PARAM_OBJECTS)?;

        debug!(job = ctx.name, ?attributes, key = %key_name, "applying PGP encryption");

        let key_directory = ctx.env.services().settings.snapshot().resources.pgp_key_directory;
        let key = Self::retrieve_key(&key_directory.join(&key_name))?;

        for_each_target(ctx, &objects, |att| {
            if matching_type(att, &attributes).is_none() {
                return Ok(());
            }
            let ciphertext = Self::encrypt(att.value(), &key)?;
            att.set_value(ciphertext);
            Ok(())
        })?;
        Ok(JobOutput::None)
    }
}

/// Anonymize based on a collection of PETs.
///
/// Maps each PET scheme the local backend understands to one of the two
/// jobs above (`suppression`/`generalization` -> level application, `pgp`
/// -> encryption); unknown schemes are skipped with a log line.
///
/// Required parameters: `pets`, `attributes`, `objects`,
/// `attribute_hierarchies`, `object_hierarchies` (shapes as in the module
/// documentation of the jobs above).
pub struct FromPets;

#[async_trait]
impl Job for FromPets {
    async fn execute(&self, ctx: &mut JobContext<'_>) -> Result<JobOutput, PipelineError> {
        ctx.verify_parameters(&[
            PARAM_PETS,
            PARAM_ATTRIBUTES,
            PARAM_OBJECTS,
            PARAM_ATTRIBUTE_HIERARCHIES,
            PARAM_OBJECT_HIERARCHIES,
        ])?;
        let pets_arg = ctx
            .arg(PARAM_PETS)
            .and_then(Value::as_array)
            .cloned()
            .ok_or_else(|| PipelineError::JobFailed("Parameter pets is not a list".into()))?;

        let mut pets: Vec<Pet> = Vec::new();
        for entry in &pets_arg {
            let pet: Pet = ctx.parse_arg_as(entry)?;
            if !KNOWN_PETS.contains(&pet.scheme.as_str()) {
                info!(job = ctx.name, scheme = %pet.scheme, "unknown local PET scheme, skipping");
                continue;
            }
            pets.push(pet);
        }
        debug!(job = ctx.name, count = pets.len(), "prepared PETs");

        let attributes = ctx.arg(PARAM_ATTRIBUTES).cloned().unwrap_or(Value::Array(vec![]));
        let objects = ctx.arg(PARAM_OBJECTS).cloned().unwrap_or(Value::Array(vec![]));
        let hierarchies = ctx
            .arg(PARAM_ATTRIBUTE_HIERARCHIES)
            .cloned()
            .unwrap_or(Value::Array(vec![]));

        let mut generated = Vec::new();
        for pet in pets {
            match pet.scheme.as_str() {
                "suppression" | "generalization" => {
                    let args = serde_json::json!({
                        "level": pet.metadata.level,
                        "attributes": attributes,
                        "objects": objects,
                        "attribute_hierarchies": hierarchies,
                    });
                    generated.push(GeneratedJob::new(
                        "apply-suppression",
                        Box::new(ApplyAnonymizationLevel),
                        args.as_object().cloned().unwrap_or_default(),
                    ));
                }
                "pgp" => {
                    let args = serde_json::json!({
                        "key": "key.gpg",
                        "attributes": attributes,
                        "objects": objects,
                    });
                    generated.push(GeneratedJob::new(
                        "apply-pgp",
                        Box::new(ApplyPgpEncryption),
                        args.as_object().cloned().unwrap_or_default(),
                    ));
                }
                other => {
                    return Err(PipelineError::JobFailed(format!("Unknown local PET scheme {}", other)));
                }
            }
        }
        Ok(JobOutput::Generated(generated))
    }

    fn is_generator(&self) -> bool {
        true
    }
}

/// Anonymize using a privacy policy.
///
/// Walks the privacy policy and emits a single local [`FromPets`] carrying
/// only the PET schemes the local backend understands, with the attribute
/// and object target lists and the hierarchies they need. Both policies
/// must have been parsed into the environment by an earlier job.
///
/// Required parameters:
///
/// - `privacy_policy_location` (`str`)
/// - `hierarchy_policy_location` (`str`)
pub struct FromPrivacyPolicy;

#[async_trait]
impl Job for FromPrivacyPolicy {
    async fn execute(&self, ctx: &mut JobContext<'_>) -> Result<JobOutput, PipelineError> {
        ctx.verify_parameters(&[PARAM_PRIVACY_POLICY_LOCATION, PARAM_HIERARCHY_POLICY_LOCATION])?;
        let privacy: PrivacyPolicy = ctx.model_from_env(ctx.arg_str(PARAM_PRIVACY_POLICY_LOCATION)?)?;
        let hierarchy: HierarchyPolicy = ctx.model_from_env(ctx.arg_str(PARAM_HIERARCHY_POLICY_LOCATION)?)?;

        let mut pets: Vec<Pet> = Vec::new();
        let mut attribute_list: Vec<String> = Vec::new();
        let mut object_list: Vec<String> = Vec::new();
        let mut hierarchy_list: Vec<HierarchyAttribute> = hierarchy.hierarchy_attributes.clone();

        for att_policy in &privacy.attributes {
            let mut used = false;
            for pet in &att_policy.pets {
                if KNOWN_PETS.contains(&pet.scheme.as_str()) {
                    used = true;
                    pets.push(pet.clone());
                }
            }
            if used {
                attribute_list.push(att_policy.name.clone());
            }
        }

        for template in &privacy.templates {
            let mut used = false;
            for att_policy in &template.attributes {
                let mut used_here = false;
                for pet in &att_policy.pets {
                    if KNOWN_PETS.contains(&pet.scheme.as_str()) {
                        used = true;
                        used_here = true;
                        pets.push(pet.clone());
                    }
                }
                if used_here {
                    attribute_list.push(att_policy.name.clone());
                }
            }
            if used {
                object_list.push(template.name.clone());
                if let Some(object_hierarchy) = hierarchy.object_hierarchy(&template.name) {
                    hierarchy_list.extend(object_hierarchy.attribute_hierarchies.iter().cloned());
                }
            }
        }

        if pets.is_empty() {
            return Ok(JobOutput::Generated(Vec::new()));
        }

        let args = serde_json::json!({
            "pets": pets,
            "attributes": attribute_list,
            "objects": object_list,
            "attribute_hierarchies": hierarchy_list,
            "object_hierarchies": hierarchy.hierarchy_objects,
        });
        Ok(JobOutput::Generated(vec![GeneratedJob::new(
            "from-pets",
            Box::new(FromPets),
            args.as_object().cloned().unwrap_or_default(),
        )]))
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
    use anonymizer_domain::entities::{Object, Request};
    use anonymizer_domain::policies::{AttributeGeneralization, HIERARCHY_KIND_INTERVAL};
    use serde_json::json;
    use std::collections::BTreeSet;

    fn local_attribute(name: &str, semantic: &str, value: &str) -> Component {
        let types: BTreeSet<String> = ["attribute", TYPE_ANONYMIZABLE_BY_LOCAL, semantic]
            .iter()
            .map(|s| s.to_string())
            .collect();
        Component::Attribute(Attribute::with_types(name, types, value))
    }

    fn size_hierarchy() -> HierarchyAttribute {
        HierarchyAttribute {
            attribute_name: "size".into(),
            attribute_type: HIERARCHY_KIND_INTERVAL.into(),
            attribute_generalization: vec![
                AttributeGeneralization {
                    interval: vec!["<=10".into(), "11-50".into(), ">50".into()],
                    ..Default::default()
                },
                AttributeGeneralization {
                    interval: vec!["<=50".into(), ">50".into()],
                    ..Default::default()
                },
            ],
        }
    }

    fn env_with(data: Vec<Component>) -> crate::execution::Environment {
        let mut env = test_env();
        env.set(KEY_DATA, EnvValue::Data(Request::new(BTreeSet::new(), data)));
        env
    }

    #[tokio::test]
    async fn level_replaces_values_from_the_ladder() {
        let mut env = env_with(vec![local_attribute("size-1", "size", "42")]);
        let args = json!({
            "level": 1,
            "attributes": ["size"],
            "objects": [],
            "attribute_hierarchies": [size_hierarchy()],
        })
        .as_object()
        .cloned()
        .unwrap();
        let mut ctx = JobContext {
            name: "apply",
            env: &mut env,
            args: &args,
        };
        ApplyAnonymizationLevel.execute(&mut ctx).await.unwrap();

        let data = env.data().unwrap();
        let att = data.components()[0].as_attribute().unwrap();
        assert_eq!(att.value(), "11-50");
    }

    #[tokio::test]
    async fn level_equal_to_ladder_depth_fails() {
        // The ladder for "42" is ["42", "11-50", "<=50"]: depth 3.
        let mut env = env_with(vec![local_attribute("size-1", "size", "42")]);
        for (level, expect_ok) in [(2i64, true), (3, false)] {
            let args = json!({
                "level": level,
                "attributes": ["size"],
                "objects": [],
                "attribute_hierarchies": [size_hierarchy()],
            })
            .as_object()
            .cloned()
            .unwrap();
            let mut ctx = JobContext {
                name: "apply",
                env: &mut env,
                args: &args,
            };
            let result = ApplyAnonymizationLevel.execute(&mut ctx).await;
            assert_eq!(result.is_ok(), expect_ok, "level {}", level);
        }
        // The coarsest value won.
        let att = env.data().unwrap().components()[0].as_attribute().unwrap();
        assert_eq!(att.value(), "<=50");
    }

    #[tokio::test]
    async fn object_scoping_only_touches_listed_object_types() {
        let inner = vec![local_attribute("size-1", "size", "42")];
        let types: BTreeSet<String> = ["object", TYPE_ANONYMIZABLE_BY_LOCAL, "network-flow"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let mut env = env_with(vec![
            Component::Object(Object::with_types("flow-1", types, inner)),
            local_attribute("size-2", "size", "7"),
        ]);
        let args = json!({
            "level": 1,
            "attributes": ["size"],
            "objects": ["network-flow"],
            "attribute_hierarchies": [size_hierarchy()],
        })
        .as_object()
        .cloned()
        .unwrap();
        let mut ctx = JobContext {
            name: "apply",
            env: &mut env,
            args: &args,
        };
        ApplyAnonymizationLevel.execute(&mut ctx).await.unwrap();

        let data = env.data().unwrap();
        let object = data.components()[0].as_object().unwrap();
        assert_eq!(object.components()[0].as_attribute().unwrap().value(), "11-50");
        // The top-level attribute was out of scope.
        assert_eq!(data.components()[1].as_attribute().unwrap().value(), "7");
    }

    #[tokio::test]
    async fn from_pets_maps_schemes_to_jobs_and_skips_foreign_ones() {
        let mut env = test_env();
        let args = json!({
            "pets": [
                {"scheme": "suppression", "metadata": {"level": 2}},
                {"scheme": "k-anonymity", "metadata": {"k": 3}},
                {"scheme": "pgp", "metadata": {}}
            ],
            "attributes": ["size"],
            "objects": [],
            "attribute_hierarchies": [],
            "object_hierarchies": [],
        })
        .as_object()
        .cloned()
        .unwrap();
        let mut ctx = JobContext {
            name: "from-pets",
            env: &mut env,
            args: &args,
        };
        match FromPets.execute(&mut ctx).await.unwrap() {
            JobOutput::Generated(children) => {
                let names: Vec<&str> = children.iter().map(|c| c.name.as_str()).collect();
                assert_eq!(names, vec!["apply-suppression", "apply-pgp"]);
                assert_eq!(children[0].args["level"], 2);
            }
            _ => panic!("expected generated jobs"),
        }
    }

    #[tokio::test]
    async fn policy_walk_emits_a_single_from_pets() {
        let mut env = test_env();
        let privacy = json!({
            "creator": "c", "organization": "o", "version": "1",
            "attributes": [
                {"name": "size", "type": "counter", "dp": false,
                 "pets": [{"scheme": "generalization", "metadata": {"level": 1}},
                           {"scheme": "laplace", "metadata": {}}]}
            ],
            "templates": []
        });
        let hierarchy = json!({
            "creator": "c", "organization": "o", "version": "1",
            "hierarchy_objects": [],
            "hierarchy_attributes": [size_hierarchy()]
        });
        env.set_model("privacy", privacy);
        env.set_model("hierarchy", hierarchy);
        let args = json!({
            "privacy_policy_location": "privacy",
            "hierarchy_policy_location": "hierarchy",
        })
        .as_object()
        .cloned()
        .unwrap();
        let mut ctx = JobContext {
            name: "policy",
            env: &mut env,
            args: &args,
        };
        match FromPrivacyPolicy.execute(&mut ctx).await.unwrap() {
            JobOutput::Generated(children) => {
                assert_eq!(children.len(), 1);
                assert_eq!(children[0].name, "from-pets");
                let pets = children[0].args["pets"].as_array().unwrap();
                // Only the local scheme survived the walk.
                assert_eq!(pets.len(), 1);
                assert_eq!(pets[0]["scheme"], "generalization");
                assert_eq!(children[0].args["attributes"], json!(["size"]));
            }
            _ => panic!("expected generated jobs"),
        }
    }
}
