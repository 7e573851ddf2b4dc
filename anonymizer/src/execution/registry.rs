// /////////////////////////////////////////////////////////////////////////////
// Privacy-Preserving Pipeline Orchestrator
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Job Registry
//!
//! Pipeline descriptions select jobs by dotted name string
//! (`"arxlet.FromPrivacyPolicy"`). The registry maps those names to
//! constructor functions. Unknown names collapse to the no-op job with a
//! logged incident - a misspelled type must not take the whole pipeline
//! down.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use tracing::error;

use crate::execution::job::Job;
use crate::execution::jobs;

type JobConstructor = fn() -> Box<dyn Job>;

static REGISTRY: Lazy<HashMap<&'static str, JobConstructor>> = Lazy::new(|| {
    let mut map: HashMap<&'static str, JobConstructor> = HashMap::new();

    // Control and reply jobs.
    map.insert("RequestPong", || Box::new(jobs::RequestPong));
    map.insert("DataPong", || Box::new(jobs::DataPong));
    map.insert("ResultsPong", || Box::new(jobs::ResultsPong));
    map.insert("ModelPong", || Box::new(jobs::ModelPong));
    map.insert("DummyJob", || Box::new(jobs::DummyJob));
    map.insert("DummyGeneratorJob", || Box::new(jobs::DummyGeneratorJob));
    map.insert("Empty", || Box::new(jobs::Empty));

    // Policy parsing.
    map.insert("policies.ReadPrivacyPolicy", || Box::new(jobs::policies::ReadPrivacyPolicy));
    map.insert("policies.ReadHierarchyPolicy", || {
        Box::new(jobs::policies::ReadHierarchyPolicy)
    });

    // Context store.
    map.insert("context.StoreRequest", || Box::new(jobs::context::StoreRequest));

    // ARXlet (statistical disclosure control).
    map.insert("arxlet.FromPrivacyPolicy", || Box::new(jobs::arxlet::FromPrivacyPolicy));
    map.insert("arxlet.FromPets", || Box::new(jobs::arxlet::FromPets));
    map.insert("arxlet.KAnonymity", || Box::new(jobs::arxlet::KAnonymity));
    map.insert("arxlet.DistinctLDiversity", || {
        Box::new(jobs::arxlet::DistinctLDiversity)
    });
    map.insert("arxlet.EntropyLDiversity", || Box::new(jobs::arxlet::EntropyLDiversity));
    map.insert("arxlet.RecursiveCLDiversity", || {
        Box::new(jobs::arxlet::RecursiveCLDiversity)
    });
    map.insert("arxlet.HierarchicalTCloseness", || {
        Box::new(jobs::arxlet::HierarchicalTCloseness)
    });
    map.insert("arxlet.OrderedTCloseness", || Box::new(jobs::arxlet::OrderedTCloseness));
    map.insert("arxlet.KMap", || Box::new(jobs::arxlet::KMap));

    // FlaskDP (differential privacy).
    map.insert("flaskdp.FromPrivacyPolicy", || {
        Box::new(jobs::flaskdp::FromPrivacyPolicy)
    });
    map.insert("flaskdp.FromTechnique", || Box::new(jobs::flaskdp::FromTechnique));
    map.insert("flaskdp.Laplace", || Box::new(jobs::flaskdp::Laplace));
    map.insert("flaskdp.LaplaceTruncated", || Box::new(jobs::flaskdp::LaplaceTruncated));
    map.insert("flaskdp.LaplaceBoundedDomain", || {
        Box::new(jobs::flaskdp::LaplaceBoundedDomain)
    });
    map.insert("flaskdp.LaplaceBoundedNoise", || {
        Box::new(jobs::flaskdp::LaplaceBoundedNoise)
    });
    map.insert("flaskdp.Gaussian", || Box::new(jobs::flaskdp::Gaussian));
    map.insert("flaskdp.GaussianAnalytic", || Box::new(jobs::flaskdp::GaussianAnalytic));

    // Local backend.
    map.insert("local.FromPrivacyPolicy", || Box::new(jobs::local::FromPrivacyPolicy));
    map.insert("local.FromPets", || Box::new(jobs::local::FromPets));
    map.insert("local.ApplyAnonymizationLevel", || {
        Box::new(jobs::local::ApplyAnonymizationLevel)
    });
    map.insert("local.ApplyPGPEncryption", || Box::new(jobs::local::ApplyPgpEncryption));

    // Sinks and conversions.
    map.insert("misp.MispPong", || Box::new(jobs::misp::MispPong));
    map.insert("misp.UpdateEvent", || Box::new(jobs::misp::UpdateEvent));
    map.insert("misp.PostEvent", || Box::new(jobs::misp::PostEvent));
    map.insert("misp.ExtractEventFromEventAnon", || {
        Box::new(jobs::misp::ExtractEventFromEventAnon)
    });
    map.insert("mqtt.Publish", || Box::new(jobs::mqtt::Publish));
    map.insert("stix.StixPong", || Box::new(jobs::stix::StixPong));
    map.insert("stix.TransformMISPEvent", || Box::new(jobs::stix::TransformMispEvent));

    map
});

/// Instantiates the job registered under `job_type`.
///
/// Unknown names log the incident and yield the no-op job.
pub fn job_from_type(job_type: &str) -> Box<dyn Job> {
    match REGISTRY.get(job_type) {
        Some(constructor) => constructor(),
        None => {
            error!(job_type, "unknown job type, installing no-op job");
            Box::new(jobs::Empty)
        }
    }
}

/// The registered job type names, for diagnostics.
pub fn known_types() -> Vec<&'static str> {
    let mut types: Vec<&'static str> = REGISTRY.keys().copied().collect();
    types.sort_unstable();
    types
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_backends_are_registered() {
        for name in [
            "DummyJob",
            "policies.ReadPrivacyPolicy",
            "arxlet.FromPrivacyPolicy",
            "arxlet.KMap",
            "flaskdp.GaussianAnalytic",
            "local.ApplyPGPEncryption",
            "misp.PostEvent",
            "mqtt.Publish",
            "stix.TransformMISPEvent",
            "context.StoreRequest",
        ] {
            assert!(known_types().contains(&name), "missing {}", name);
        }
    }
}
