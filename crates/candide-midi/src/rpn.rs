//! Registered Parameter Number assembly.
//!
//! RPNs arrive as a CC 101/100 parameter select followed by CC 6 (and
//! optionally CC 38) data entry. Only two parameters matter here:
//! RPN 0 (pitch bend sensitivity) and RPN 6 (MPE Configuration Message).

use crate::event::{MidiChannel, MpeEvent};
use crate::zone::ZoneId;

pub(crate) const CC_DATA_ENTRY_MSB: u8 = 6;
pub(crate) const CC_DATA_ENTRY_LSB: u8 = 38;
pub(crate) const CC_DATA_INCREMENT: u8 = 96;
pub(crate) const CC_DATA_DECREMENT: u8 = 97;
pub(crate) const CC_NRPN_LSB: u8 = 98;
pub(crate) const CC_NRPN_MSB: u8 = 99;
pub(crate) const CC_RPN_LSB: u8 = 100;
pub(crate) const CC_RPN_MSB: u8 = 101;

const RPN_PITCH_BEND_SENSITIVITY: (u8, u8) = (0, 0);
const RPN_MPE_CONFIGURATION: (u8, u8) = (0, 6);
const RPN_NULL: (u8, u8) = (127, 127);

/// What the assembler did with a control change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RpnOutcome {
    /// Not part of an RPN/NRPN sequence; forward as a plain CC.
    PassThrough,
    /// Swallowed as part of a sequence.
    Consumed,
    /// Swallowed and completed a parameter.
    Event(MpeEvent),
}

#[derive(Debug, Clone, Copy, Default)]
struct ChannelRpn {
    msb: Option<u8>,
    lsb: Option<u8>,
    nrpn: bool,
    data_msb: Option<u8>,
}

impl ChannelRpn {
    fn selected(&self) -> Option<(u8, u8)> {
        if self.nrpn {
            return None;
        }
        match (self.msb, self.lsb) {
            (Some(msb), Some(lsb)) if (msb, lsb) != RPN_NULL => Some((msb, lsb)),
            _ => None,
        }
    }
}

/// Per-channel RPN selection state.
#[derive(Debug, Clone, Default)]
pub(crate) struct RpnAssembler {
    channels: [ChannelRpn; 16],
}

impl RpnAssembler {
    pub(crate) fn handle_cc(
        &mut self,
        channel: MidiChannel,
        controller: u8,
        value: u8,
    ) -> RpnOutcome {
        let state = &mut self.channels[(channel & 0x0F) as usize];
        match controller {
            CC_RPN_MSB => {
                state.msb = Some(value);
                state.nrpn = false;
                state.data_msb = None;
                RpnOutcome::Consumed
            }
            CC_RPN_LSB => {
                state.lsb = Some(value);
                state.nrpn = false;
                state.data_msb = None;
                RpnOutcome::Consumed
            }
            CC_NRPN_MSB | CC_NRPN_LSB => {
                state.nrpn = true;
                state.data_msb = None;
                RpnOutcome::Consumed
            }
            CC_DATA_ENTRY_MSB => {
                let Some(param) = state.selected() else {
                    return RpnOutcome::Consumed;
                };
                state.data_msb = Some(value);
                match param {
                    RPN_MPE_CONFIGURATION => match ZoneId::from_master_channel(channel) {
                        Some(zone) => RpnOutcome::Event(MpeEvent::ZoneChange {
                            zone,
                            member_count: value,
                        }),
                        None => {
                            tracing::trace!(
                                "Discarding MPE configuration on non-master channel {}",
                                channel
                            );
                            RpnOutcome::Consumed
                        }
                    },
                    RPN_PITCH_BEND_SENSITIVITY => RpnOutcome::Event(MpeEvent::PitchBendRange {
                        channel,
                        semitones: value,
                        cents: 0,
                    }),
                    _ => RpnOutcome::Consumed,
                }
            }
            CC_DATA_ENTRY_LSB => match (state.selected(), state.data_msb) {
                (Some(RPN_PITCH_BEND_SENSITIVITY), Some(semitones)) => {
                    RpnOutcome::Event(MpeEvent::PitchBendRange {
                        channel,
                        semitones,
                        cents: value,
                    })
                }
                _ => RpnOutcome::Consumed,
            },
            CC_DATA_INCREMENT | CC_DATA_DECREMENT => RpnOutcome::Consumed,
            _ => RpnOutcome::PassThrough,
        }
    }

    pub(crate) fn reset(&mut self) {
        self.channels = [ChannelRpn::default(); 16];
    }
}
