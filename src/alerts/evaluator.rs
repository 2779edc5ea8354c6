//! Rule evaluation against a price snapshot
//!
//! A rule fires once per qualifying price transition: the watermark
//! (`last_evaluated_price`) moves on every evaluated price, so a price that
//! stays on the qualifying side does not fire again until it changes.

use crate::alerts::{AlertRule, TriggerEvent};
use crate::hot_path::PriceLookup;
use time::OffsetDateTime;

/// Evaluate `rules` in place, stamping events with the current time
pub fn tick<P: PriceLookup + ?Sized>(rules: &mut [AlertRule], prices: &P) -> Vec<TriggerEvent> {
    tick_at(rules, prices, OffsetDateTime::now_utc())
}

pub fn tick_at<P: PriceLookup + ?Sized>(
    rules: &mut [AlertRule],
    prices: &P,
    now: OffsetDateTime,
) -> Vec<TriggerEvent> {
    let mut events = Vec::new();

    for rule in rules.iter_mut() {
        if !rule.active {
            continue;
        }
        let Some(current) = prices.price_of(&rule.instrument_id) else {
            continue;
        };
        if rule.last_evaluated_price == Some(current) {
            continue;
        }
        rule.last_evaluated_price = Some(current);

        if !rule.direction.crossed(current, rule.target_price) {
            continue;
        }

        if !rule.recurring {
            rule.active = false;
        }
        events.push(TriggerEvent {
            rule_id: rule.id.clone(),
            owner: rule.owner.clone(),
            instrument_id: rule.instrument_id.clone(),
            direction: rule.direction,
            target_price: rule.target_price,
            recurring: rule.recurring,
            price: current,
            timestamp: now,
        });
    }

    events
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::Direction;
    use crate::core::{FixedPoint8, InstrumentId};
    use crate::test_utils::price;
    use std::collections::HashMap;

    struct Prices(HashMap<InstrumentId, FixedPoint8>);

    impl PriceLookup for Prices {
        fn price_of(&self, id: &InstrumentId) -> Option<FixedPoint8> {
            self.0.get(id).copied()
        }
    }

    fn at(p: i64) -> Prices {
        Prices(HashMap::from([(InstrumentId::new("bitcoin"), price(p))]))
    }

    fn rule(direction: Direction, target: i64, recurring: bool) -> AlertRule {
        AlertRule::new("ops@example.com", "bitcoin".into(), price(target), direction, recurring)
    }

    fn run(rules: &mut [AlertRule], sequence: &[i64]) -> Vec<TriggerEvent> {
        sequence
            .iter()
            .flat_map(|p| tick_at(rules, &at(*p), OffsetDateTime::UNIX_EPOCH))
            .collect()
    }

    #[test]
    fn test_recurring_fires_once_per_transition() {
        let mut rules = vec![rule(Direction::Above, 100, true)];
        let events = run(&mut rules, &[99, 101, 101, 99, 101]);

        assert_eq!(events.len(), 2);
        assert!(events.iter().all(|e| e.price == price(101)));
        assert!(rules[0].active);
    }

    #[test]
    fn test_non_recurring_fires_once() {
        let mut rules = vec![rule(Direction::Above, 100, false)];
        let events = run(&mut rules, &[99, 101, 99, 102, 150]);

        assert_eq!(events.len(), 1);
        assert!(!rules[0].active);
        assert_eq!(rules[0].last_evaluated_price, Some(price(101)));
    }

    #[test]
    fn test_below_direction() {
        let mut rules = vec![rule(Direction::Below, 100, true)];
        let events = run(&mut rules, &[105, 100, 98, 98, 120]);

        // 100 is inclusive, 98 is a new price on the same side
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].price, price(100));
        assert_eq!(events[1].price, price(98));
    }

    #[test]
    fn test_missing_price_leaves_watermark() {
        let mut rules = vec![rule(Direction::Above, 100, true)];
        let events = tick_at(&mut rules, &Prices(HashMap::new()), OffsetDateTime::UNIX_EPOCH);

        assert!(events.is_empty());
        assert_eq!(rules[0].last_evaluated_price, None);
    }

    #[test]
    fn test_inactive_rule_skipped() {
        let mut rules = vec![rule(Direction::Above, 100, true)];
        rules[0].active = false;
        assert!(run(&mut rules, &[150]).is_empty());
        assert_eq!(rules[0].last_evaluated_price, None);
    }

    #[test]
    fn test_first_look_at_qualifying_price_fires() {
        let mut rules = vec![rule(Direction::Above, 100, true)];
        let events = run(&mut rules, &[120]);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].owner, "ops@example.com");
        assert_eq!(events[0].timestamp, OffsetDateTime::UNIX_EPOCH);
    }

    #[test]
    fn test_rules_evaluated_independently() {
        let mut rules = vec![
            rule(Direction::Above, 100, true),
            rule(Direction::Below, 100, true),
            AlertRule::new("ops", "ethereum".into(), price(1), Direction::Above, true),
        ];
        let events = run(&mut rules, &[101]);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].rule_id, rules[0].id);
        assert_eq!(rules[1].last_evaluated_price, Some(price(101)));
        assert_eq!(rules[2].last_evaluated_price, None);
    }
}
