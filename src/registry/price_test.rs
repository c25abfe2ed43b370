use super::*;
use crate::support::fixtures;
use proptest::prelude::*;

fn apps() -> Apps {
    Apps::default()
}

fn spec(cpu: f64, ram: f64, hdd: f64, instances: u32) -> AppSpec {
    let mut s = fixtures::flat_spec("AppX", cpu, ram, hdd);
    fixtures::set_instances(&mut s, instances);
    s
}

#[test]
fn first_bucket_example() {
    // 1*3*10 + 1000*1/100 + 10*0.5 = 45
    assert_eq!(price(&spec(1.0, 1000.0, 10.0, 3), 100, &apps()), 45.0);
}

#[test]
fn instance_surcharge_is_a_third_per_extra_instance() {
    // 45 + 45 * 3/3
    assert_eq!(price(&spec(1.0, 1000.0, 10.0, 6), 100, &apps()), 90.0);
}

#[test]
fn minimum_applies_to_tiny_apps() {
    let p = price(&spec(0.1, 100.0, 1.0, 3), 1_004_000, &apps());
    // 0.1*0.06*10 + 100*0.02/100 + 1*0.01 = 0.09
    assert!((p - 0.09).abs() < 1e-9);
    let bucket = PriceBucket { height: 0, cpu: 0.0, ram: 0.0, hdd: 0.0, minimum: 0.5 };
    assert_eq!(price_with(&spec(0.1, 100.0, 1.0, 3), &bucket), 0.5);
}

#[test]
fn rounding_goes_up_to_cents() {
    assert_eq!(round_up_cents(1.001), 1.01);
    assert_eq!(round_up_cents(1.0), 1.0);
    assert_eq!(round_up_cents(0.1 + 0.2), 0.3);
}

#[test]
fn tiered_components_bill_their_largest_tier() {
    let mut s = spec(1.0, 1000.0, 10.0, 3);
    fixtures::set_tiered(&mut s, [(1.0, 1000.0, 10.0), (2.0, 1000.0, 10.0), (3.0, 2000.0, 20.0)]);
    // 3*3*10 + 2000/100 + 20*0.5 = 120
    assert_eq!(price(&s, 0, &apps()), 120.0);
}

#[test]
fn fresh_update_is_discounted_but_not_below_ninety_percent() {
    let prev = spec(1.0, 1000.0, 10.0, 3);
    let next = spec(2.0, 1000.0, 10.0, 3); // 75
    let p = update_price(&next, 1000, &prev, 1000, &apps());
    assert_eq!(p, 67.5);
}

#[test]
fn discount_shrinks_with_elapsed_blocks() {
    let prev = spec(1.0, 1000.0, 10.0, 3); // 45
    let next = spec(10.0, 1000.0, 10.0, 3); // 315
    let half = update_price(&next, 11_000, &prev, 0, &apps());
    assert_eq!(half, 292.5); // 315 - 45/2
    let expired = update_price(&next, 30_000, &prev, 0, &apps());
    assert_eq!(expired, 315.0);
}

proptest! {
    #[test]
    fn price_is_monotonic(
        cpu in 1u32..80, ram in 1u32..300, hdd in 1u32..500, inst in 3u32..100,
        dcpu in 0u32..10, dram in 0u32..10, dhdd in 0u32..10, dinst in 0u32..5,
        height in prop::sample::select(vec![0u64, 983_000, 1_004_000]),
    ) {
        let a = apps();
        let lo = spec(cpu as f64 / 10.0, ram as f64 * 100.0, hdd as f64, inst);
        let hi = spec(
            (cpu + dcpu) as f64 / 10.0,
            (ram + dram) as f64 * 100.0,
            (hdd + dhdd) as f64,
            inst + dinst,
        );
        let p_lo = price(&lo, height, &a);
        prop_assert!(p_lo >= a.price_at(height).minimum);
        prop_assert!(price(&hi, height, &a) >= p_lo);
    }

    #[test]
    fn update_price_respects_floors(
        cpu in 1u32..80, prev_cpu in 1u32..80, elapsed in 0u64..40_000,
    ) {
        let a = apps();
        let next = spec(cpu as f64 / 10.0, 1000.0, 10.0, 3);
        let prev = spec(prev_cpu as f64 / 10.0, 1000.0, 10.0, 3);
        let height = 1_100_000;
        let p = update_price(&next, height, &prev, height - elapsed, &a);
        let full = price(&next, height, &a);
        prop_assert!(p >= full * MIN_UPDATE_SHARE - 1e-9);
        prop_assert!(p >= a.price_at(height).minimum);
        prop_assert!(p <= full + 1e-9);
    }
}
