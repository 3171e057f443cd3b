// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! BMP operations: power, LEDs, FPGA registers, ADC, version.
//!
//! BMP frames are SCP-shaped; failures are annotated with the board's
//! cabinet/frame/board position.

use crate::error::{Error, Result};
use crate::model::version::VersionInfo;
use crate::pipeline::{ScampLink, SubmitOptions};
use crate::protocol::constants::{LedAction, PowerCommand};
use crate::protocol::{ScpRequest, ScpResponse};
use crate::transceiver::{round_trip_on, BmpCoords, Transceiver};

/// Settle delay handed to the BMP between board power transitions.
const POWER_DELAY_MS: u32 = 0;

/// ADC readings of one board.
///
/// The payload carries eight voltage senses (1.2 V rails, 1.8 V, 3.3 V,
/// supply), four temperature senses and two fan tachometers.
#[derive(Debug, Clone, PartialEq)]
pub struct AdcData {
    /// Voltage readings in volts.
    pub voltages: [f64; 8],
    /// Temperatures in degrees Celsius.
    pub temperatures: [f64; 4],
    /// Fan speeds in RPM.
    pub fan_speeds: [u16; 2],
}

impl AdcData {
    /// Scale of the 12-bit voltage senses.
    const VOLTAGE_SCALE: f64 = 2.5 / 4096.0;
    /// Scale of the temperature senses.
    const TEMPERATURE_SCALE: f64 = 1.0 / 256.0;

    fn decode(response: &ScpResponse) -> Result<Self> {
        let payload = response.payload();
        if payload.len() < 28 {
            return Err(Error::MalformedPacket(format!(
                "ADC block needs 28 bytes, got {}",
                payload.len()
            )));
        }
        let i16_at = |off: usize| i16::from_le_bytes([payload[off], payload[off + 1]]);
        let mut voltages = [0.0; 8];
        for (i, v) in voltages.iter_mut().enumerate() {
            *v = f64::from(i16_at(i * 2)) * Self::VOLTAGE_SCALE;
        }
        let mut temperatures = [0.0; 4];
        for (i, t) in temperatures.iter_mut().enumerate() {
            *t = f64::from(i16_at(16 + i * 2)) * Self::TEMPERATURE_SCALE;
        }
        let fan_speeds = [
            u16::from_le_bytes([payload[24], payload[25]]),
            u16::from_le_bytes([payload[26], payload[27]]),
        ];
        Ok(AdcData {
            voltages,
            temperatures,
            fan_speeds,
        })
    }
}

impl Transceiver {
    fn bmp_link(&self, cabinet: u8, frame: u8) -> Result<(&BmpCoords, &std::sync::Arc<ScampLink>)> {
        self.ensure_open()?;
        self.bmp_iter()
            .find(|(coords, _)| coords.cabinet == cabinet && coords.frame == frame)
            .ok_or_else(|| {
                Error::UnsupportedOperation(format!("BMP for cabinet {} frame {}", cabinet, frame))
            })
    }

    fn bmp_round_trip(
        &self,
        cabinet: u8,
        frame: u8,
        board: u8,
        request: ScpRequest,
        options: SubmitOptions,
    ) -> Result<ScpResponse> {
        let (_, link) = self.bmp_link(cabinet, frame)?;
        round_trip_on(link, request, options).map_err(|err| Error::Bmp {
            cabinet,
            frame,
            board,
            cause: Box::new(err),
        })
    }

    /// Power a set of boards on or off.
    pub fn power(
        &self,
        command: PowerCommand,
        cabinet: u8,
        frame: u8,
        boards: &[u8],
    ) -> Result<()> {
        let mask = board_mask(boards);
        let board = boards.first().copied().unwrap_or(0);
        self.bmp_round_trip(
            cabinet,
            frame,
            board,
            ScpRequest::bmp_power(command, mask, POWER_DELAY_MS),
            SubmitOptions::named("Power"),
        )?;
        Ok(())
    }

    /// Power on every board behind every registered BMP.
    pub fn power_on_machine(&self) -> Result<()> {
        self.ensure_open()?;
        let racks: Vec<(u8, u8, Vec<u8>)> = self
            .bmp_iter()
            .map(|(coords, _)| (coords.cabinet, coords.frame, coords.boards.clone()))
            .collect();
        for (cabinet, frame, boards) in racks {
            self.power(PowerCommand::PowerOn, cabinet, frame, &boards)?;
        }
        Ok(())
    }

    /// Read a 32-bit FPGA register.
    pub fn read_fpga_register(
        &self,
        cabinet: u8,
        frame: u8,
        board: u8,
        fpga: u8,
        register: u32,
    ) -> Result<u32> {
        let response = self.bmp_round_trip(
            cabinet,
            frame,
            board,
            ScpRequest::fpga_register_read(board, fpga, register),
            SubmitOptions::named("ReadFPGARegister"),
        )?;
        response.payload_u32(0)
    }

    /// Write a 32-bit FPGA register.
    pub fn write_fpga_register(
        &self,
        cabinet: u8,
        frame: u8,
        board: u8,
        fpga: u8,
        register: u32,
        value: u32,
    ) -> Result<()> {
        self.bmp_round_trip(
            cabinet,
            frame,
            board,
            ScpRequest::fpga_register_write(board, fpga, register, value),
            SubmitOptions::named("WriteFPGARegister"),
        )?;
        Ok(())
    }

    /// Read the ADC (voltage/temperature/fan) data of one board.
    pub fn read_adc_data(&self, cabinet: u8, frame: u8, board: u8) -> Result<AdcData> {
        let response = self.bmp_round_trip(
            cabinet,
            frame,
            board,
            ScpRequest::bmp_adc_read(board),
            SubmitOptions::named("ReadADC"),
        )?;
        AdcData::decode(&response)
    }

    /// Read the software version of one BMP.
    pub fn get_bmp_version(&self, cabinet: u8, frame: u8, board: u8) -> Result<VersionInfo> {
        let response = self.bmp_round_trip(
            cabinet,
            frame,
            board,
            ScpRequest::bmp_version(board),
            SubmitOptions::named("Version"),
        )?;
        VersionInfo::decode(&response)
    }

    /// Drive BMP-controlled LEDs on a set of boards.
    pub fn set_bmp_led(
        &self,
        cabinet: u8,
        frame: u8,
        boards: &[u8],
        leds: &[u8],
        action: LedAction,
    ) -> Result<()> {
        let mask = board_mask(boards);
        let board = boards.first().copied().unwrap_or(0);
        self.bmp_round_trip(
            cabinet,
            frame,
            board,
            ScpRequest::bmp_set_led(mask, leds, action),
            SubmitOptions::named("SetLED"),
        )?;
        Ok(())
    }
}

fn board_mask(boards: &[u8]) -> u32 {
    boards.iter().fold(0u32, |mask, &b| mask | (1 << b))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::constants::ScpResult;
    use crate::protocol::sdp::SdpHeader;
    use crate::protocol::ChipCoord;

    #[test]
    fn test_board_mask() {
        assert_eq!(board_mask(&[0, 2, 5]), 0b100101);
        assert_eq!(board_mask(&[]), 0);
    }

    #[test]
    fn test_adc_decode() {
        let mut payload = Vec::new();
        for i in 0..8i16 {
            payload.extend_from_slice(&(i * 100).to_le_bytes());
        }
        // 32.0 C and three zeros.
        payload.extend_from_slice(&(32i16 * 256).to_le_bytes());
        payload.extend_from_slice(&[0u8; 6]);
        payload.extend_from_slice(&3000u16.to_le_bytes());
        payload.extend_from_slice(&2800u16.to_le_bytes());

        let header = SdpHeader::scp_request(ChipCoord::new(0, 0), 0);
        let mut frame = vec![0u8; 2];
        header.write_into(&mut frame);
        frame.extend_from_slice(&ScpResult::Ok.value().to_le_bytes());
        frame.extend_from_slice(&0u16.to_le_bytes());
        frame.extend_from_slice(&payload);
        let response = ScpResponse::from_datagram(frame).expect("valid frame");

        let adc = AdcData::decode(&response).expect("valid block");
        assert!((adc.voltages[1] - 100.0 * 2.5 / 4096.0).abs() < 1e-9);
        assert!((adc.temperatures[0] - 32.0).abs() < 1e-9);
        assert_eq!(adc.fan_speeds, [3000, 2800]);
    }
}
