use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};

use crate::{Ping, VehicleName};

/// A vehicle idle for longer than this has finished one trip and started another.
pub const MAX_GAP_HOURS: i64 = 7;

/// When pings with a bad position or timestamp get dropped
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Validation {
    /// Bad pings take part in segmentation and are only dropped while exporting. A ping without a
    /// time sorts after all of the vehicle's timed pings and never causes a split, so it lands in
    /// that vehicle's last trip.
    AtExport,
    /// Bad pings are dropped before grouping, so they can't influence any trip boundary.
    BeforeSegmenting,
}

#[derive(Clone, Debug)]
pub struct SegmentOptions {
    /// A gap strictly greater than this splits a trip
    pub max_gap: Duration,
    pub validation: Validation,
}

impl Default for SegmentOptions {
    fn default() -> Self {
        Self {
            max_gap: Duration::hours(MAX_GAP_HOURS),
            validation: Validation::AtExport,
        }
    }
}

/// A maximal run of one vehicle's pings, sorted by time, without any long gap between
/// consecutive pings. Never empty.
#[derive(Clone, Debug, PartialEq)]
pub struct Trip {
    vehicle: VehicleName,
    pings: Vec<Ping>,
}

impl Trip {
    pub fn vehicle(&self) -> &VehicleName {
        &self.vehicle
    }

    pub fn pings(&self) -> &[Ping] {
        &self.pings
    }

    /// None if no ping in the trip has a valid time
    pub fn start_time(&self) -> Option<DateTime<Utc>> {
        self.pings[0].time
    }

    pub fn end_time(&self) -> Option<DateTime<Utc>> {
        self.pings.iter().rev().find_map(|p| p.time)
    }
}

/// Splits an unordered stream of pings from many vehicles into trips. Vehicles are handled in
/// order of their name, and each vehicle's trips in time order, so the output only depends on the
/// input.
pub fn extract_trips(pings: Vec<Ping>, opts: &SegmentOptions) -> Vec<Trip> {
    let num_pings = pings.len();
    let mut dropped = 0;

    // BTreeMap iterates in key order, which fixes the order of vehicles
    let mut per_vehicle: BTreeMap<VehicleName, Vec<Ping>> = BTreeMap::new();
    for ping in pings {
        if opts.validation == Validation::BeforeSegmenting && !ping.is_valid() {
            dropped += 1;
            continue;
        }
        per_vehicle
            .entry(ping.vehicle.clone())
            .or_insert_with(Vec::new)
            .push(ping);
    }
    if dropped > 0 {
        warn!("Dropped {dropped} / {num_pings} pings before finding trips");
    }

    let num_vehicles = per_vehicle.len();
    let trips: Vec<Trip> = per_vehicle
        .into_iter()
        .flat_map(|pair| split_into_trips(pair, opts.max_gap))
        .collect();
    info!(
        "Found {} trips from {num_pings} pings across {num_vehicles} vehicles",
        trips.len()
    );
    trips
}

fn split_into_trips(
    (vehicle, mut pings): (VehicleName, Vec<Ping>),
    max_gap: Duration,
) -> Vec<Trip> {
    // Stable, with untimed pings last
    pings.sort_by_key(|p| (p.time.is_none(), p.time));

    let mut trips = Vec::new();
    let mut current: Vec<Ping> = Vec::new();
    for ping in pings {
        let split = match (current.last().and_then(|p| p.time), ping.time) {
            (Some(t1), Some(t2)) => t2 - t1 > max_gap,
            // Without both times, there's no gap to measure
            _ => false,
        };
        if split {
            trips.push(Trip {
                vehicle: vehicle.clone(),
                pings: std::mem::take(&mut current),
            });
        }
        current.push(ping);
    }
    if !current.is_empty() {
        trips.push(Trip {
            vehicle,
            pings: current,
        });
    }
    trips
}
