// Hosting price from declared resources and the height-bucketed price table.

use crate::config::{Apps, PriceBucket};
use crate::model::hardware::{Hardware, Resources, Tier};
use crate::model::AppSpec;

/// Instances included in the base price.
pub const BASE_INSTANCES: u32 = 3;
/// Share of the new price an update discount can never go below.
pub const MIN_UPDATE_SHARE: f64 = 0.9;

/// Rounds up to the next cent. The epsilon keeps exact cents from jumping after float noise.
pub fn round_up_cents(v: f64) -> f64 {
    ((v * 100.0) - 1e-6).ceil() / 100.0
}

/// Resources a component is billed for: the largest declared value per dimension.
fn billed(hw: &Hardware) -> Resources {
    match &hw.tiered {
        None => hw.flat,
        Some(_) => Tier::ALL.iter().fold(hw.flat, |acc, t| {
            let r = hw.for_tier(*t);
            Resources::new(acc.cpu.max(r.cpu), acc.ram.max(r.ram), acc.hdd.max(r.hdd))
        }),
    }
}

/// Price of one run of `blocks_lasting` blocks for `spec` under `bucket`.
pub fn price_with(spec: &AppSpec, bucket: &PriceBucket) -> f64 {
    let raw: f64 = spec
        .components()
        .iter()
        .map(|c| {
            let r = billed(&c.hardware);
            r.cpu * bucket.cpu * 10.0 + r.ram * bucket.ram / 100.0 + r.hdd * bucket.hdd
        })
        .sum();
    let base = round_up_cents(raw).max(bucket.minimum);

    let instances = spec.instances();
    if instances > BASE_INSTANCES {
        let extra = (instances - BASE_INSTANCES) as f64;
        round_up_cents(base + base * extra / BASE_INSTANCES as f64)
    } else {
        base
    }
}

/// Price of `spec` at `height`.
pub fn price(spec: &AppSpec, height: u64, apps: &Apps) -> f64 {
    price_with(spec, &apps.price_at(height))
}

/// Price of an update at `height` whose previous version was anchored at `prev_height`.
///
/// The unused share of the previous payment is credited, but the result stays at or above
/// 90% of the new price and at or above the bucket minimum.
pub fn update_price(spec: &AppSpec, height: u64, prev: &AppSpec, prev_height: u64, apps: &Apps) -> f64 {
    let bucket = apps.price_at(height);
    let new_price = price_with(spec, &bucket);
    let prev_price = price(prev, prev_height, apps);

    let lasting = apps.blocks_lasting as f64;
    let elapsed = height.saturating_sub(prev_height) as f64;
    let remaining_share = ((lasting - elapsed) / lasting).max(0.0);
    let discounted = new_price - prev_price * remaining_share;

    round_up_cents(discounted.max(new_price * MIN_UPDATE_SHARE).max(bucket.minimum))
}

#[cfg(test)]
#[path = "price_test.rs"]
mod price_test;
