// /////////////////////////////////////////////////////////////////////////////
// Privacy-Preserving Pipeline Orchestrator
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Domain entities: the tagged component tree and the top-level request.

pub mod component;
pub mod request;

pub use component::{
    Attribute, Component, ComponentContainer, Object, DEFAULT_ATTRIBUTE_TYPE, DEFAULT_OBJECT_TYPE,
    TYPE_ANONYMIZABLE,
};
pub use request::Request;
