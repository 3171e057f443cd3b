// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! IP tag management and inbound tag listeners.

use std::net::Ipv4Addr;
use std::sync::Arc;

use crate::config::{SCP_SCAMP_PORT, UDP_BOOT_PORT};
use crate::error::{Error, Result};
use crate::listener::{Listener, PacketCallback};
use crate::model::{IpTag, IpTagDescriptor, ReverseIpTag};
use crate::pipeline::{ScampLink, SubmitOptions};
use crate::protocol::{ChipCoord, ScpRequest};
use crate::transceiver::{round_trip_on, Transceiver};
use crate::transport::udp::UdpEndpoint;

/// Fixed IP tag slots a monitor offers.
const N_FIXED_TAGS: u8 = 8;

impl Transceiver {
    /// SCAMP links matching a board address, or all of them for `None`.
    fn tag_links(&self, board_address: Option<Ipv4Addr>) -> Result<Vec<Arc<ScampLink>>> {
        let links: Vec<Arc<ScampLink>> = self
            .links_snapshot()
            .into_iter()
            .filter(|link| !link.endpoint().capabilities().bmp)
            .filter(|link| match board_address {
                None => true,
                Some(board) => link.endpoint().remote_ip() == Some(board.into()),
            })
            .collect();
        if links.is_empty() {
            return Err(Error::UnsupportedOperation("IP tag".to_string()));
        }
        Ok(links)
    }

    fn tag_chip(link: &ScampLink) -> ChipCoord {
        link.endpoint()
            .remote_chip()
            .unwrap_or_else(|| ChipCoord::new(0, 0))
    }

    /// Install an IP tag on the matching board, or on every board.
    pub fn set_ip_tag(&self, tag: &IpTag) -> Result<()> {
        self.ensure_open()?;
        for link in self.tag_links(tag.board_address)? {
            let request = ScpRequest::iptag_set(
                Self::tag_chip(&link),
                tag.tag,
                tag.ip_address.octets(),
                tag.port,
                tag.strip_sdp,
            );
            round_trip_on(&link, request, SubmitOptions::named("IPTagSet"))?;
        }
        Ok(())
    }

    /// Install a reverse IP tag.
    ///
    /// The listening port must not collide with the SCAMP or boot ports.
    pub fn set_reverse_ip_tag(&self, tag: &ReverseIpTag) -> Result<()> {
        self.ensure_open()?;
        if tag.port == SCP_SCAMP_PORT || tag.port == UDP_BOOT_PORT {
            return Err(Error::InvalidParameter {
                field: "port",
                value: tag.port.to_string(),
                reason: "reverse tags may not shadow the SCAMP or boot ports",
            });
        }
        for link in self.tag_links(tag.board_address)? {
            let request = ScpRequest::reverse_iptag_set(
                Self::tag_chip(&link),
                tag.tag,
                tag.port,
                tag.destination,
                tag.sdp_port,
            );
            round_trip_on(&link, request, SubmitOptions::named("ReverseIPTagSet"))?;
        }
        Ok(())
    }

    /// Remove a tag from the matching board, or from every board.
    pub fn clear_ip_tag(&self, tag: u8, board_address: Option<Ipv4Addr>) -> Result<()> {
        self.ensure_open()?;
        for link in self.tag_links(board_address)? {
            let request = ScpRequest::iptag_clear(Self::tag_chip(&link), tag);
            round_trip_on(&link, request, SubmitOptions::named("IPTagClear"))?;
        }
        Ok(())
    }

    /// Read the in-use tag descriptors of one board, or of every board.
    pub fn get_tags(&self, board_address: Option<Ipv4Addr>) -> Result<Vec<IpTagDescriptor>> {
        self.ensure_open()?;
        let mut descriptors = Vec::new();
        for link in self.tag_links(board_address)? {
            for tag in 0..N_FIXED_TAGS {
                let request = ScpRequest::iptag_get(Self::tag_chip(&link), tag);
                let response = round_trip_on(&link, request, SubmitOptions::named("IPTagGet"))?;
                let descriptor = IpTagDescriptor::decode(tag, &response)?;
                if descriptor.in_use() {
                    descriptors.push(descriptor);
                }
            }
        }
        Ok(descriptors)
    }

    /// Register a callback for traffic arriving on a local UDP port.
    ///
    /// One listener exists per local port; callbacks added later share it.
    pub fn register_tag_listener(&self, local_port: u16, callback: PacketCallback) -> Result<u16> {
        self.ensure_open()?;
        let mut listeners = self.listeners().lock();
        if let Some(listener) = listeners.get(&local_port) {
            listener.add_callback(callback);
            return Ok(listener.endpoint().local_addr().port());
        }
        let endpoint = Arc::new(UdpEndpoint::bind_listener(local_port)?);
        let bound_port = endpoint.local_addr().port();
        let listener = Listener::start(endpoint);
        listener.add_callback(callback);
        listeners.insert(bound_port, listener);
        log::debug!("[TAGS] listener on port {}", bound_port);
        Ok(bound_port)
    }
}
