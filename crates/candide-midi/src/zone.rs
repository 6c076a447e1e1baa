//! MPE zone configuration and channel routing.

use std::ops::RangeInclusive;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::event::MidiChannel;

/// Default per-note pitch bend range in semitones.
pub const DEFAULT_MEMBER_BEND_RANGE: f32 = 48.0;

/// Default master-channel pitch bend range in semitones.
pub const DEFAULT_MASTER_BEND_RANGE: f32 = 2.0;

/// Most member channels a single zone may claim.
pub const MAX_MEMBER_CHANNELS: u8 = 15;

/// MPE Zone identifier
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ZoneId {
    /// Lower Zone (master Ch1)
    Lower,
    /// Upper Zone (master Ch16)
    Upper,
}

impl ZoneId {
    /// Master channel (0-indexed)
    #[inline]
    pub fn master_channel(self) -> MidiChannel {
        match self {
            ZoneId::Lower => 0,
            ZoneId::Upper => 15,
        }
    }

    /// Zone whose master sits on `channel`, if any.
    #[inline]
    pub fn from_master_channel(channel: MidiChannel) -> Option<Self> {
        match channel {
            0 => Some(ZoneId::Lower),
            15 => Some(ZoneId::Upper),
            _ => None,
        }
    }

    #[inline]
    pub fn other(self) -> Self {
        match self {
            ZoneId::Lower => ZoneId::Upper,
            ZoneId::Upper => ZoneId::Lower,
        }
    }
}

/// One enabled MPE zone.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Zone {
    pub id: ZoneId,
    pub member_count: u8,
    /// Semitones applied to per-note (member channel) bend
    pub pitch_bend_range: f32,
    /// Semitones applied to zone-wide (master channel) bend
    pub master_pitch_bend_range: f32,
}

impl Zone {
    fn new(id: ZoneId, member_count: u8) -> Self {
        Self {
            id,
            member_count,
            pitch_bend_range: DEFAULT_MEMBER_BEND_RANGE,
            master_pitch_bend_range: DEFAULT_MASTER_BEND_RANGE,
        }
    }

    #[inline]
    pub fn master_channel(&self) -> MidiChannel {
        self.id.master_channel()
    }

    /// Members: Ch2 (1) up to Ch(1+n) for lower, Ch15 (14) down to Ch(16-n) for upper.
    pub fn member_channels(&self) -> RangeInclusive<MidiChannel> {
        match self.id {
            ZoneId::Lower => 1..=self.member_count,
            ZoneId::Upper => (15 - self.member_count)..=14,
        }
    }

    #[inline]
    pub fn is_master_channel(&self, channel: MidiChannel) -> bool {
        channel == self.master_channel()
    }

    #[inline]
    pub fn is_member_channel(&self, channel: MidiChannel) -> bool {
        self.member_channels().contains(&channel)
    }

    #[inline]
    pub fn handles_channel(&self, channel: MidiChannel) -> bool {
        self.is_master_channel(channel) || self.is_member_channel(channel)
    }

    /// Every channel the zone claims, master included.
    fn claimed(&self) -> RangeInclusive<MidiChannel> {
        match self.id {
            ZoneId::Lower => 0..=self.member_count,
            ZoneId::Upper => (15 - self.member_count)..=15,
        }
    }
}

/// Snapshot of both zones.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Zones {
    pub lower: Option<Zone>,
    pub upper: Option<Zone>,
}

impl Zones {
    #[inline]
    pub fn get(&self, id: ZoneId) -> Option<&Zone> {
        match id {
            ZoneId::Lower => self.lower.as_ref(),
            ZoneId::Upper => self.upper.as_ref(),
        }
    }
}

/// Member counts to configure at power-on (0 = zone disabled).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZoneLayout {
    pub lower_members: u8,
    pub upper_members: u8,
}

impl Default for ZoneLayout {
    /// Lower zone on Ch2-Ch15, upper zone disabled.
    fn default() -> Self {
        Self {
            lower_members: 14,
            upper_members: 0,
        }
    }
}

/// Role a channel plays inside its zone.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChannelRole {
    Master,
    Member,
}

/// Result of routing a channel to its owning zone.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChannelRoute {
    pub zone: ZoneId,
    pub role: ChannelRole,
}

impl ChannelRoute {
    #[inline]
    pub fn is_master(&self) -> bool {
        self.role == ChannelRole::Master
    }

    #[inline]
    pub fn is_member(&self) -> bool {
        self.role == ChannelRole::Member
    }
}

/// Owns the zone configuration and answers "which zone owns this channel".
#[derive(Clone, Debug, Default)]
pub struct ZoneManager {
    zones: Zones,
}

impl ZoneManager {
    /// No zones configured; every channel is inert until the first Zone-Change.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_layout(layout: ZoneLayout) -> Result<Self> {
        let mut manager = Self::new();
        manager.configure(ZoneId::Lower, 0, layout.lower_members)?;
        manager.configure(ZoneId::Upper, 15, layout.upper_members)?;
        Ok(manager)
    }

    /// Enable, resize or (with `member_count == 0`) disable a zone.
    ///
    /// On error the previous configuration stays in place untouched.
    pub fn configure(
        &mut self,
        zone: ZoneId,
        master_channel: MidiChannel,
        member_count: u8,
    ) -> Result<()> {
        if master_channel != zone.master_channel() {
            return Err(Error::InvalidZoneConfig {
                zone,
                reason: format!(
                    "master channel must be {}, got {}",
                    zone.master_channel(),
                    master_channel
                ),
            });
        }
        if member_count > MAX_MEMBER_CHANNELS {
            return Err(Error::InvalidZoneConfig {
                zone,
                reason: format!("{member_count} member channels exceeds {MAX_MEMBER_CHANNELS}"),
            });
        }

        if member_count == 0 {
            if self.slot_mut(zone).take().is_some() {
                tracing::info!("MPE {:?} zone disabled", zone);
            }
            return Ok(());
        }

        let candidate = Zone::new(zone, member_count);
        if let Some(other) = self.zones.get(zone.other()) {
            let mine = candidate.claimed();
            let theirs = other.claimed();
            if mine.start() <= theirs.end() && theirs.start() <= mine.end() {
                return Err(Error::InvalidZoneConfig {
                    zone,
                    reason: format!(
                        "channels {:?} overlap {:?} zone channels {:?}",
                        mine,
                        other.id,
                        theirs
                    ),
                });
            }
        }

        tracing::info!(
            "MPE {:?} zone configured: {} member channels {:?}",
            zone,
            member_count,
            candidate.member_channels()
        );
        *self.slot_mut(zone) = Some(candidate);
        Ok(())
    }

    #[inline]
    pub fn current_zones(&self) -> Zones {
        self.zones
    }

    #[inline]
    pub fn zone(&self, id: ZoneId) -> Option<&Zone> {
        self.zones.get(id)
    }

    /// Owning zone and role for `channel`, or `None` if the channel is inert.
    pub fn route(&self, channel: MidiChannel) -> Option<ChannelRoute> {
        [self.zones.lower.as_ref(), self.zones.upper.as_ref()]
            .into_iter()
            .flatten()
            .find_map(|zone| {
                if zone.is_master_channel(channel) {
                    Some(ChannelRoute {
                        zone: zone.id,
                        role: ChannelRole::Master,
                    })
                } else if zone.is_member_channel(channel) {
                    Some(ChannelRoute {
                        zone: zone.id,
                        role: ChannelRole::Member,
                    })
                } else {
                    None
                }
            })
    }

    /// Apply RPN 0. Master channel sets the zone-wide range, any member
    /// channel sets the per-note range for the whole zone.
    pub fn set_pitch_bend_range(
        &mut self,
        channel: MidiChannel,
        semitones: u8,
        cents: u8,
    ) -> Result<ChannelRoute> {
        if channel > 15 {
            return Err(Error::InvalidChannel(channel));
        }
        let route = self
            .route(channel)
            .ok_or(Error::UnassignedChannel(channel))?;
        let range = crate::scale::bend_range_semitones(semitones, cents);
        if let Some(zone) = self.slot_mut(route.zone).as_mut() {
            match route.role {
                ChannelRole::Master => zone.master_pitch_bend_range = range,
                ChannelRole::Member => zone.pitch_bend_range = range,
            }
            tracing::debug!(
                "{:?} zone {:?} bend range set to {} semitones",
                route.zone,
                route.role,
                range
            );
        }
        Ok(route)
    }

    /// Per-note bend range for `zone`, falling back to the MPE default.
    #[inline]
    pub fn member_bend_range(&self, zone: ZoneId) -> f32 {
        self.zone(zone)
            .map(|z| z.pitch_bend_range)
            .unwrap_or(DEFAULT_MEMBER_BEND_RANGE)
    }

    #[inline]
    pub fn master_bend_range(&self, zone: ZoneId) -> f32 {
        self.zone(zone)
            .map(|z| z.master_pitch_bend_range)
            .unwrap_or(DEFAULT_MASTER_BEND_RANGE)
    }

    fn slot_mut(&mut self, id: ZoneId) -> &mut Option<Zone> {
        match id {
            ZoneId::Lower => &mut self.zones.lower,
            ZoneId::Upper => &mut self.zones.upper,
        }
    }
}
