// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Connection selection for multi-board machines.
//!
//! A request addressed to a chip should leave the host on the board that
//! chip sits on: first an endpoint whose remote chip is the destination
//! itself, then one on the destination's ethernet chip, then whatever is
//! nearest. Ties break on pipeline load.

use std::sync::Arc;

use crate::error::{Error, Result};
use crate::model::machine::Machine;
use crate::pipeline::{PipelineConfig, RequestPipeline, SequenceAllocator};
use crate::protocol::ChipCoord;
use crate::transport::udp::UdpEndpoint;

/// An SCP-capable endpoint paired with its pipeline.
#[derive(Debug)]
pub struct ScampLink {
    endpoint: Arc<UdpEndpoint>,
    pipeline: RequestPipeline,
}

impl ScampLink {
    /// Wrap an endpoint with a pipeline sharing `sequences`.
    #[must_use]
    pub fn new(
        endpoint: UdpEndpoint,
        sequences: Arc<SequenceAllocator>,
        config: PipelineConfig,
    ) -> Arc<Self> {
        let endpoint = Arc::new(endpoint);
        let pipeline = RequestPipeline::new(Arc::clone(&endpoint), sequences, config);
        Arc::new(ScampLink { endpoint, pipeline })
    }

    /// The endpoint.
    #[must_use]
    pub fn endpoint(&self) -> &Arc<UdpEndpoint> {
        &self.endpoint
    }

    /// The pipeline owning the endpoint's socket.
    #[must_use]
    pub fn pipeline(&self) -> &RequestPipeline {
        &self.pipeline
    }
}

/// Preference rank of a link for a destination; lower is better.
fn rank(link: &ScampLink, destination: ChipCoord, machine: Option<&Machine>) -> u32 {
    match link.endpoint.remote_chip() {
        Some(chip) if chip == destination => 0,
        Some(chip) => {
            let ethernet = machine
                .and_then(|m| m.chip(destination))
                .map(|c| c.nearest_ethernet);
            if ethernet == Some(chip) {
                1
            } else {
                2 + chip.distance(destination)
            }
        }
        None => u32::MAX,
    }
}

/// Choose the best SCP-sending link for a request to `destination`.
///
/// Returns `UnsupportedOperation` when no registered link can send SCP.
pub fn select_link(
    links: &[Arc<ScampLink>],
    destination: ChipCoord,
    machine: Option<&Machine>,
) -> Result<Arc<ScampLink>> {
    links
        .iter()
        .filter(|link| link.endpoint.capabilities().scp_send)
        .min_by_key(|link| (rank(link, destination, machine), link.pipeline.in_progress()))
        .cloned()
        .ok_or_else(|| Error::UnsupportedOperation("SCP".to_string()))
}
