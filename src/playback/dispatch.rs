use crate::core::{EntityKey, Tick};
use crate::playback::binding::BindingTable;
use crate::playback::clock::TickStep;
use crate::units::UnitHandle;

/// Messages one unit returned from a tick
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitMessages {
    pub key: EntityKey,
    pub messages: Vec<String>,
}

/// Activation change to apply on the control thread
#[derive(Clone)]
pub struct StatusChange {
    pub key: EntityKey,
    pub unit: UnitHandle,
    pub active: bool,
}

impl std::fmt::Debug for StatusChange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatusChange")
            .field("key", &self.key)
            .field("active", &self.active)
            .finish()
    }
}

/// Everything one dispatched tick produced
#[derive(Debug, Clone)]
pub struct TickReport {
    pub tick: Tick,
    pub discontinuity: bool,
    pub messages: Vec<UnitMessages>,
    pub status: Vec<StatusChange>,
}

/// Play `step` on every bound unit, in table order.
///
/// Units are only fed frames here; activation changes are collected for the
/// control thread. A normal tick takes the status event at exactly that tick.
/// A discontinuity takes the latest event at or before it, so a jump lands on
/// the state the recording had at the target.
pub fn dispatch_tick(table: &BindingTable, step: TickStep) -> TickReport {
    let mut report = TickReport {
        tick: step.tick,
        discontinuity: step.discontinuity,
        messages: Vec::new(),
        status: Vec::new(),
    };

    for binder in table.binders() {
        let Some(unit) = &binder.unit else {
            continue;
        };

        let messages = unit.play_tick(step.tick);
        if !messages.is_empty() {
            report.messages.push(UnitMessages {
                key: binder.key.clone(),
                messages,
            });
        }

        let Some(record) = &binder.record else {
            continue;
        };
        let event = if step.discontinuity {
            record.latest_status(step.tick)
        } else {
            record.status_at(step.tick)
        };
        if let Some(event) = event {
            report.status.push(StatusChange {
                key: binder.key.clone(),
                unit: unit.clone(),
                active: event.active,
            });
        }
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{EntityRecord, RecordingStream};
    use crate::units::{MockUnit, UnitRegistry};
    use std::sync::Arc;

    fn hand_setup() -> (BindingTable, Arc<MockUnit>) {
        let mut record = EntityRecord::new("Hand_L", "hand");
        record.add_status(true, 0);
        record.add_status(false, 10);
        record.add_status(true, 25);
        let stream = Arc::new(RecordingStream::new(30, 40, vec![record]));

        let unit = Arc::new(MockUnit::new("Hand_L", "hand"));
        let mut registry = UnitRegistry::new();
        registry.register(unit.clone());

        let mut table = BindingTable::new();
        table.rebuild(&[stream.clone()], &registry);
        table.resolve_active_stream(&stream);
        (table, unit)
    }

    fn step(tick: Tick, discontinuity: bool) -> TickStep {
        TickStep { tick, discontinuity }
    }

    #[test]
    fn test_exact_status_on_normal_ticks() {
        let (table, unit) = hand_setup();

        let report = dispatch_tick(&table, step(10, false));
        assert_eq!(report.status.len(), 1);
        assert!(!report.status[0].active);

        assert!(dispatch_tick(&table, step(11, false)).status.is_empty());
        assert_eq!(unit.played_ticks(), vec![10, 11]);
    }

    #[test]
    fn test_scrub_derives_latest_status() {
        let (table, _) = hand_setup();

        let report = dispatch_tick(&table, step(15, true));
        assert_eq!(report.status.len(), 1);
        assert!(!report.status[0].active);

        let report = dispatch_tick(&table, step(30, true));
        assert!(report.status[0].active);
    }

    #[test]
    fn test_unbound_and_recordless_binders_skipped() {
        let stream = Arc::new(RecordingStream::new(
            30,
            10,
            vec![EntityRecord::new("Ghost", "transform")],
        ));
        let mut table = BindingTable::new();
        table.rebuild(&[stream.clone()], &UnitRegistry::new());
        table.resolve_active_stream(&stream);

        let report = dispatch_tick(&table, step(0, true));
        assert!(report.messages.is_empty());
        assert!(report.status.is_empty());
    }

    #[test]
    fn test_messages_collected() {
        let (table, unit) = hand_setup();
        unit.script_message(3, "missing target");

        let report = dispatch_tick(&table, step(3, false));
        assert_eq!(report.messages.len(), 1);
        assert_eq!(report.messages[0].key, EntityKey::new("Hand_L", "hand"));
        assert_eq!(report.messages[0].messages, vec!["missing target".to_string()]);
    }
}
