//! End-to-end tick scenarios.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use lodestone_core::behavior::BlockBehaviors;
use lodestone_core::behavior::BlockBehaviour;
use lodestone_core::behavior::blocks::{LAMP, LEVER, LampBlock, LeverBlock, POWERED, REPEATER, RepeaterBlock};
use lodestone_core::capture::{CaptureRecord, CaptureTarget, CapturedState};
use lodestone_core::cause::CauseFrame;
use lodestone_core::config::TickConfig;
use lodestone_core::driver::{CrashTarget, TickDriver};
use lodestone_core::gate::Decision;
use lodestone_core::ticks::EntryHandle;
use lodestone_core::world::{BlockEntity, EntityBehaviour, EntitySnapshot, PendingMutation, TickContext};
use lodestone_core::SimulationFault;
use lodestone_utils::math::Vector3;
use lodestone_utils::{BlockId, BlockPos, BlockState, EntityId};
use proptest::prelude::*;
use uuid::Uuid;

const SCRIPTED: BlockId = BlockId(20);
const DOOMED: BlockId = BlockId(21);
const BUILDER: BlockId = BlockId(22);
const STONE: BlockState = BlockState::new(BlockId(1), 0);

// Steps forward along x every tick and optionally fails on a given tick.
struct Walker {
    fail: bool,
}

impl EntityBehaviour for Walker {
    fn tick(&mut self, ctx: &mut TickContext<'_>, id: EntityId) -> Result<(), SimulationFault> {
        let here = ctx.entity(id).map(|snapshot| snapshot.position).unwrap_or_default();
        ctx.move_entity(id, Vector3::new(here.x + 1.0, here.y, here.z))?;
        if self.fail {
            return Err(SimulationFault::handler("walked into the void"));
        }
        Ok(())
    }

    fn type_name(&self) -> &'static str {
        "walker"
    }
}

struct Counted(Arc<AtomicUsize>);

impl EntityBehaviour for Counted {
    fn tick(&mut self, _ctx: &mut TickContext<'_>, _id: EntityId) -> Result<(), SimulationFault> {
        self.0.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct Spawner {
    spawned: bool,
    ticks: Arc<AtomicUsize>,
}

impl EntityBehaviour for Spawner {
    fn tick(&mut self, ctx: &mut TickContext<'_>, _id: EntityId) -> Result<(), SimulationFault> {
        if !self.spawned {
            self.spawned = true;
            ctx.spawn_entity(EntitySnapshot::default(), Some(Box::new(Counted(self.ticks.clone()))))?;
        }
        Ok(())
    }
}

struct Player(Uuid);

impl EntityBehaviour for Player {
    fn tick(&mut self, _ctx: &mut TickContext<'_>, _id: EntityId) -> Result<(), SimulationFault> {
        Ok(())
    }

    fn is_player(&self) -> bool {
        true
    }

    fn notifier(&self) -> Option<Uuid> {
        Some(self.0)
    }
}

// Flips the lever next to it through a block event on the first tick.
struct Switch {
    lever: BlockPos,
    fired: bool,
}

impl BlockEntity for Switch {
    fn tick(&mut self, ctx: &mut TickContext<'_>, _pos: BlockPos) -> Result<(), SimulationFault> {
        if !self.fired {
            self.fired = true;
            ctx.queue_block_event(self.lever, LeverBlock::TOGGLE_EVENT, 0);
        }
        Ok(())
    }

    fn type_name(&self) -> &'static str {
        "switch"
    }
}

struct Exploding;

impl BlockEntity for Exploding {
    fn tick(&mut self, ctx: &mut TickContext<'_>, pos: BlockPos) -> Result<(), SimulationFault> {
        ctx.set_block(pos.offset(0, 1, 0), BlockState::new(BlockId(1), 0))?;
        panic!("block entity at {pos} exploded");
    }

    fn type_name(&self) -> &'static str {
        "exploding"
    }
}

struct Planter {
    planted: bool,
    ticks: Arc<AtomicUsize>,
}

impl BlockEntity for Planter {
    fn tick(&mut self, ctx: &mut TickContext<'_>, pos: BlockPos) -> Result<(), SimulationFault> {
        self.ticks.fetch_add(1, Ordering::SeqCst);
        if !self.planted {
            self.planted = true;
            ctx.add_block_entity(
                pos.offset(1, 0, 0),
                Box::new(Planter {
                    planted: true,
                    ticks: self.ticks.clone(),
                }),
            )?;
        }
        Ok(())
    }

    fn type_name(&self) -> &'static str {
        "planter"
    }
}

// Removes itself on every tick.
struct SelfRemoving {
    ticks: Arc<AtomicUsize>,
}

impl BlockEntity for SelfRemoving {
    fn tick(&mut self, ctx: &mut TickContext<'_>, pos: BlockPos) -> Result<(), SimulationFault> {
        self.ticks.fetch_add(1, Ordering::SeqCst);
        ctx.remove_block_entity(pos)?;
        Ok(())
    }

    fn type_name(&self) -> &'static str {
        "self removing"
    }
}

// Schedules a lamp update once from inside a user's cause scope.
struct Relay {
    lamp: BlockPos,
    user: Uuid,
    fired: bool,
}

impl BlockEntity for Relay {
    fn tick(&mut self, ctx: &mut TickContext<'_>, _pos: BlockPos) -> Result<(), SimulationFault> {
        if !self.fired {
            self.fired = true;
            let lamp = self.lamp;
            ctx.with_cause(CauseFrame::notifier(self.user), |ctx| {
                ctx.schedule_tick(lamp, LAMP, 1, 0);
            });
        }
        Ok(())
    }

    fn type_name(&self) -> &'static str {
        "relay"
    }
}

// Reschedules itself, cancels the shared victim entry, writes a block and fails.
struct Doomed {
    victim: Arc<Mutex<Option<EntryHandle>>>,
}

impl BlockBehaviour for Doomed {
    fn name(&self) -> &'static str {
        "doomed"
    }

    fn tick(&self, ctx: &mut TickContext<'_>, pos: BlockPos, _state: BlockState) -> Result<(), SimulationFault> {
        ctx.schedule_tick(pos, DOOMED, 1, 0);
        let victim = *self.victim.lock().expect("victim handle");
        if let Some(victim) = victim {
            ctx.cancel_tick(victim);
        }
        ctx.set_block(pos.offset(0, 6, 0), STONE)?;
        Err(SimulationFault::handler("doomed block gave up"))
    }
}

// Places a block with a block entity on top of itself.
struct Builder {
    ticks: Arc<AtomicUsize>,
    fail: bool,
}

impl BlockBehaviour for Builder {
    fn name(&self) -> &'static str {
        "builder"
    }

    fn tick(&self, ctx: &mut TickContext<'_>, pos: BlockPos, _state: BlockState) -> Result<(), SimulationFault> {
        let above = pos.offset(0, 1, 0);
        ctx.set_block(above, STONE)?;
        ctx.add_block_entity(
            above,
            Box::new(Planter {
                planted: true,
                ticks: self.ticks.clone(),
            }),
        )?;
        if self.fail {
            return Err(SimulationFault::handler("builder ran out of stone"));
        }
        Ok(())
    }
}

// Performs a scripted list of writes, the second half from a nested cause scope.
struct Scripted {
    writes: Vec<(BlockPos, BlockState)>,
    fail: bool,
}

impl BlockBehaviour for Scripted {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn tick(&self, ctx: &mut TickContext<'_>, pos: BlockPos, _state: BlockState) -> Result<(), SimulationFault> {
        let (outer, inner) = self.writes.split_at(self.writes.len() / 2);
        for (target, state) in outer {
            ctx.set_block(*target, *state)?;
        }
        ctx.with_cause(CauseFrame::block(pos, SCRIPTED), |ctx| {
            for (target, state) in inner {
                ctx.set_block(*target, *state)?;
            }
            Ok::<(), SimulationFault>(())
        })?;
        if self.fail {
            return Err(SimulationFault::handler("script failed"));
        }
        Ok(())
    }
}

fn redstone_driver() -> TickDriver {
    TickDriver::new(TickConfig::default(), BlockBehaviors::vanilla())
}

fn build_circuit(driver: &mut TickDriver) -> (BlockPos, BlockPos, BlockPos) {
    let lever = BlockPos::new(0, 0, 0);
    let repeater = BlockPos::new(1, 0, 0);
    let lamp = BlockPos::new(2, 0, 0);
    let world = driver.world_mut();
    world.set_block(lever, LeverBlock::state(false));
    world.set_block(repeater, RepeaterBlock::state());
    world.set_block(lamp, LampBlock::state());
    (lever, repeater, lamp)
}

fn set_lever(driver: &TickDriver, pos: BlockPos, powered: bool, notifier: Option<Uuid>) {
    driver
        .world()
        .inbox()
        .submit(
            notifier,
            PendingMutation::SetBlock {
                pos,
                state: LeverBlock::state(powered),
                notify_neighbors: true,
            },
        )
        .expect("inbox has room");
}

fn scripted_driver(writes: Vec<(BlockPos, BlockState)>, fail: bool) -> TickDriver {
    let mut behaviors = BlockBehaviors::new();
    behaviors.register(SCRIPTED, Arc::new(Scripted { writes, fail }));
    let mut driver = TickDriver::new(TickConfig::default(), behaviors);
    driver
        .world_mut()
        .set_block(BlockPos::new(0, -1, 0), BlockState::new(SCRIPTED, 0));
    driver
}

fn builder_driver(ticks: &Arc<AtomicUsize>, fail: bool) -> TickDriver {
    let mut behaviors = BlockBehaviors::new();
    behaviors.register(
        BUILDER,
        Arc::new(Builder {
            ticks: ticks.clone(),
            fail,
        }),
    );
    let mut driver = TickDriver::new(TickConfig::default(), behaviors);
    driver
        .world_mut()
        .set_block(BlockPos::new(0, 0, 0), BlockState::new(BUILDER, 0));
    driver.add_scheduled(BlockPos::new(0, 0, 0), 0, 0);
    driver
}

fn sorted_blocks(driver: &TickDriver) -> Vec<(BlockPos, BlockState)> {
    let mut blocks: Vec<_> = driver.world().blocks().collect();
    blocks.sort_by_key(|(pos, _)| (pos.0.x, pos.0.y, pos.0.z));
    blocks
}

#[test]
fn test_repeater_delays_lamp() {
    let mut driver = redstone_driver();
    let (lever, repeater, lamp) = build_circuit(&mut driver);
    let user = Uuid::from_u128(0xabc);

    let causes = Arc::new(Mutex::new(Vec::new()));
    let sink = causes.clone();
    driver.set_gate(move |_cause: &CauseFrame, batch: &[CaptureRecord]| {
        sink.lock()
            .expect("gate sink")
            .extend(batch.iter().map(|record| (record.target, record.cause)));
        Decision::Approve
    });

    set_lever(&driver, lever, true, Some(user));

    let first = driver.tick();
    assert_eq!(first.inbox_applied, 1);
    assert!(driver.world().block_state(lever).flag(POWERED));
    assert_eq!(driver.get_scheduled(repeater).len(), 1);

    driver.tick();
    assert!(!driver.world().block_state(repeater).flag(POWERED));

    let third = driver.tick();
    assert_eq!(third.scheduled_run, 1);
    assert!(driver.world().block_state(repeater).flag(POWERED));
    assert!(driver.world().block_state(lamp).flag(POWERED));

    // The lamp was lit by the repeater's scheduled tick, which carried the lever user's stamp.
    let causes = causes.lock().expect("gate sink");
    let (_, lamp_cause) = causes
        .iter()
        .find(|(target, _)| *target == CaptureTarget::Block(lamp))
        .expect("lamp change captured");
    assert_eq!(lamp_cause.ticking_block, Some((lamp, LAMP)));
    assert_eq!(lamp_cause.notifier, Some(user));
}

#[test]
fn test_lamp_turns_off_after_delay() {
    let mut driver = redstone_driver();
    let (lever, repeater, lamp) = build_circuit(&mut driver);

    set_lever(&driver, lever, true, None);
    for _ in 0..3 {
        driver.tick();
    }
    assert!(driver.world().block_state(lamp).flag(POWERED));

    // Tick 4 switches the lever off, the repeater follows on tick 6.
    set_lever(&driver, lever, false, None);
    for _ in 4..=6 {
        driver.tick();
    }
    assert!(!driver.world().block_state(repeater).flag(POWERED));
    assert!(driver.world().block_state(lamp).flag(POWERED));
    assert_eq!(driver.get_scheduled(lamp).len(), 1);

    for _ in 7..=9 {
        driver.tick();
    }
    assert!(driver.world().block_state(lamp).flag(POWERED));

    driver.tick();
    assert_eq!(driver.game_time(), 10);
    assert!(!driver.world().block_state(lamp).flag(POWERED));
}

#[test]
fn test_block_event_toggles_lever() {
    let mut driver = redstone_driver();
    let (lever, repeater, _) = build_circuit(&mut driver);
    driver.world_mut().add_block_entity(
        BlockPos::new(0, 1, 0),
        Box::new(Switch {
            lever,
            fired: false,
        }),
    );

    let summary = driver.tick();
    assert_eq!(summary.block_entities_ticked, 1);
    assert_eq!(summary.block_events_delivered, 1);
    assert_eq!(driver.world().block_state(lever), LeverBlock::state(true));
    assert_eq!(driver.get_scheduled(repeater).len(), 1);
    assert_eq!(driver.world().pending_block_events(), 0);
}

#[test]
fn test_vetoed_lever_stays_off() {
    let mut driver = redstone_driver();
    let (lever, _, lamp) = build_circuit(&mut driver);
    let griefer = Uuid::from_u128(66);
    driver.set_gate(move |cause: &CauseFrame, _batch: &[CaptureRecord]| {
        if cause.notifier == Some(griefer) {
            Decision::Veto
        } else {
            Decision::Approve
        }
    });

    set_lever(&driver, lever, true, Some(griefer));
    let summary = driver.tick();
    assert_eq!(summary.vetoed, 1);
    assert_eq!(driver.world().block_state(lever), LeverBlock::state(false));

    // The repeater's pending flip finds no power once it runs.
    for _ in 0..4 {
        driver.tick();
    }
    assert_eq!(driver.world().block_state(lamp), LampBlock::state());
    assert_eq!(driver.world().block_state(BlockPos::new(1, 0, 0)).block, REPEATER);
    assert_eq!(driver.world().block_state(lever).block, LEVER);
}

#[test]
fn test_faulting_entity_does_not_stop_pass() {
    let mut driver = redstone_driver();
    let ids: Vec<EntityId> = (0..5)
        .map(|i| {
            driver
                .world_mut()
                .spawn_entity(EntitySnapshot::default(), Some(Box::new(Walker { fail: i == 2 })))
        })
        .collect();

    let summary = driver.tick();

    assert_eq!(summary.entities_ticked, 5);
    assert_eq!(summary.committed, 4);
    assert_eq!(summary.crashes.len(), 1);

    let report = &summary.crashes[0];
    assert_eq!(
        report.target,
        CrashTarget::Entity {
            id: ids[2],
            type_name: "walker"
        }
    );
    assert_eq!(report.cause.ticking_entity, Some(ids[2]));
    assert_eq!(report.error, SimulationFault::handler("walked into the void"));
    assert_eq!(report.in_flight.len(), 1);

    for (i, id) in ids.iter().enumerate() {
        let x = driver.world().entity(*id).expect("entity exists").position.x;
        let expected = if i == 2 { 0.0 } else { 1.0 };
        assert!((x - expected).abs() < f64::EPSILON, "entity {i} at x = {x}");
    }
    assert!(driver.current_cause().is_empty());
}

#[test]
fn test_panicking_block_entity_is_rolled_back() {
    let mut driver = redstone_driver();
    let bomb = BlockPos::new(5, 0, 5);
    driver.world_mut().add_block_entity(bomb, Box::new(Exploding));
    let ticks = Arc::new(AtomicUsize::new(0));
    driver.world_mut().add_block_entity(
        BlockPos::new(9, 0, 9),
        Box::new(Planter {
            planted: true,
            ticks: ticks.clone(),
        }),
    );

    let summary = driver.tick();
    assert_eq!(summary.crashes.len(), 1);
    assert!(matches!(summary.crashes[0].error, SimulationFault::Panicked(_)));
    assert!(summary.crashes[0].to_string().contains("Ticking block entity"));
    assert!(driver.world().block_state(bomb.offset(0, 1, 0)).is_air());
    assert_eq!(ticks.load(Ordering::SeqCst), 1);

    // The faulting block entity keeps ticking, and keeps being recovered.
    let summary = driver.tick();
    assert_eq!(summary.crashes.len(), 1);
    assert_eq!(ticks.load(Ordering::SeqCst), 2);
}

#[test]
fn test_added_block_entity_ticks_next_tick() {
    let mut driver = redstone_driver();
    let ticks = Arc::new(AtomicUsize::new(0));
    driver.world_mut().add_block_entity(
        BlockPos::new(0, 0, 0),
        Box::new(Planter {
            planted: false,
            ticks: ticks.clone(),
        }),
    );

    let first = driver.tick();
    assert_eq!(first.block_entities_ticked, 1);
    assert_eq!(driver.world().block_entity_count(), 2);

    let second = driver.tick();
    assert_eq!(second.block_entities_ticked, 2);
    assert_eq!(ticks.load(Ordering::SeqCst), 3);
}

#[test]
fn test_spawned_entity_ticks_next_tick() {
    let mut driver = redstone_driver();
    let ticks = Arc::new(AtomicUsize::new(0));
    driver.world_mut().spawn_entity(
        EntitySnapshot::default(),
        Some(Box::new(Spawner {
            spawned: false,
            ticks: ticks.clone(),
        })),
    );

    driver.tick();
    assert_eq!(ticks.load(Ordering::SeqCst), 0);
    assert_eq!(driver.world().entity_ids().len(), 2);

    driver.tick();
    assert_eq!(ticks.load(Ordering::SeqCst), 1);
}

#[test]
fn test_vetoed_spawn_is_pruned() {
    let mut driver = redstone_driver();
    let ticks = Arc::new(AtomicUsize::new(0));
    driver.world_mut().spawn_entity(
        EntitySnapshot::default(),
        Some(Box::new(Spawner {
            spawned: false,
            ticks: ticks.clone(),
        })),
    );
    driver.set_gate(|_cause: &CauseFrame, batch: &[CaptureRecord]| {
        if batch
            .iter()
            .any(|record| matches!(record.target, CaptureTarget::Entity(_)))
        {
            Decision::Veto
        } else {
            Decision::Approve
        }
    });

    let summary = driver.tick();
    assert_eq!(summary.vetoed, 1);
    assert_eq!(driver.world().entity_ids().len(), 1);

    driver.tick();
    assert_eq!(ticks.load(Ordering::SeqCst), 0);
}

#[test]
fn test_entity_pass_idles_without_players() {
    let config = TickConfig {
        entity_idle_timeout_ticks: 2,
        ..TickConfig::default()
    };
    let mut driver = TickDriver::new(config, BlockBehaviors::vanilla());
    let ticks = Arc::new(AtomicUsize::new(0));
    driver
        .world_mut()
        .spawn_entity(EntitySnapshot::default(), Some(Box::new(Counted(ticks.clone()))));

    assert!(!driver.tick().entity_pass_skipped);
    assert!(!driver.tick().entity_pass_skipped);
    assert!(driver.tick().entity_pass_skipped);
    assert_eq!(ticks.load(Ordering::SeqCst), 2);

    // A player wakes the pass back up.
    driver
        .world_mut()
        .spawn_entity(EntitySnapshot::default(), Some(Box::new(Player(Uuid::from_u128(1)))));
    let summary = driver.tick();
    assert!(!summary.entity_pass_skipped);
    assert_eq!(summary.entities_ticked, 2);
    assert_eq!(ticks.load(Ordering::SeqCst), 3);
}

#[test]
fn test_scheduled_cap_carries_over() {
    let config = TickConfig {
        max_scheduled_ticks_per_tick: 2,
        ..TickConfig::default()
    };
    let mut driver = TickDriver::new(config, BlockBehaviors::vanilla());
    let lamp = BlockPos::new(0, 0, 0);
    driver
        .world_mut()
        .set_block(lamp, LampBlock::state().with_flag(POWERED, true));
    for _ in 0..3 {
        driver.add_scheduled(lamp, 1, 0);
    }

    assert_eq!(driver.tick().scheduled_run, 2);
    assert_eq!(driver.scheduled_len(), 1);
    assert_eq!(driver.tick().scheduled_run, 1);
    assert!(!driver.world().block_state(lamp).flag(POWERED));
}

#[test]
fn test_nested_records_veto_to_zero() {
    let x = BlockPos::new(0, 0, 0);
    let y = BlockPos::new(0, 1, 0);
    let mut driver = scripted_driver(
        vec![
            (x, BlockState::new(BlockId(1), 0)),
            (y, BlockState::new(BlockId(1), 0)),
        ],
        false,
    );
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    driver.set_gate(move |_cause: &CauseFrame, batch: &[CaptureRecord]| {
        sink.lock()
            .expect("gate sink")
            .extend(batch.iter().map(|record| record.target));
        Decision::Veto
    });

    driver.add_scheduled(BlockPos::new(0, -1, 0), 0, 0);
    driver.tick();

    assert_eq!(
        *seen.lock().expect("gate sink"),
        vec![CaptureTarget::Block(x), CaptureTarget::Block(y)]
    );
    assert!(driver.world().block_state(x).is_air());
    assert!(driver.world().block_state(y).is_air());
}

#[test]
fn test_faulted_unit_rolls_back_scheduling() {
    let victim = Arc::new(Mutex::new(None));
    let mut behaviors = BlockBehaviors::new();
    behaviors.register(DOOMED, Arc::new(Doomed { victim: victim.clone() }));
    behaviors.register(LAMP, Arc::new(LampBlock));
    let mut driver = TickDriver::new(TickConfig::default(), behaviors);

    let doomed = BlockPos::new(0, 0, 0);
    let lamp = BlockPos::new(4, 0, 0);
    driver.world_mut().set_block(doomed, BlockState::new(DOOMED, 0));
    driver.world_mut().set_block(lamp, LampBlock::state());
    let lamp_tick = driver.add_scheduled(lamp, 3, 0);
    *victim.lock().expect("victim handle") = Some(lamp_tick);
    driver.add_scheduled(doomed, 0, 0);

    let summary = driver.tick();

    assert_eq!(summary.crashes.len(), 1);
    assert_eq!(summary.crashes[0].error, SimulationFault::handler("doomed block gave up"));
    assert!(driver.world().block_state(doomed.offset(0, 6, 0)).is_air());
    // The reschedule is dropped and the cancelled lamp update is back.
    assert!(driver.get_scheduled(doomed).is_empty());
    let pending: Vec<EntryHandle> = driver.get_scheduled(lamp).iter().map(|entry| entry.handle).collect();
    assert_eq!(pending, vec![lamp_tick]);
    assert_eq!(driver.scheduled_len(), 1);
}

#[test]
fn test_veto_keeps_scheduled_updates() {
    let mut driver = redstone_driver();
    let (lever, repeater, _) = build_circuit(&mut driver);
    driver.set_gate(|_cause: &CauseFrame, _batch: &[CaptureRecord]| Decision::Veto);

    set_lever(&driver, lever, true, None);
    let summary = driver.tick();

    assert_eq!(summary.vetoed, 1);
    assert_eq!(driver.world().block_state(lever), LeverBlock::state(false));
    assert_eq!(driver.get_scheduled(repeater).len(), 1);
}

#[test]
fn test_vetoed_block_entity_add_is_undone() {
    let ticks = Arc::new(AtomicUsize::new(0));
    let mut driver = builder_driver(&ticks, false);
    driver.set_gate(|_cause: &CauseFrame, _batch: &[CaptureRecord]| Decision::Veto);
    let above = BlockPos::new(0, 1, 0);

    let summary = driver.tick();
    assert_eq!(summary.vetoed, 1);
    assert!(driver.world().block_state(above).is_air());
    assert!(!driver.world().has_block_entity(above));
    assert_eq!(driver.world().block_entity_count(), 0);

    driver.tick();
    assert_eq!(ticks.load(Ordering::SeqCst), 0);
}

#[test]
fn test_faulted_block_entity_add_is_undone() {
    let ticks = Arc::new(AtomicUsize::new(0));
    let mut driver = builder_driver(&ticks, true);
    let above = BlockPos::new(0, 1, 0);

    let summary = driver.tick();
    assert_eq!(summary.crashes.len(), 1);
    assert_eq!(summary.crashes[0].in_flight.len(), 2);
    assert_eq!(
        summary.crashes[0].in_flight[1].target,
        CaptureTarget::BlockEntity(above)
    );
    assert!(driver.world().block_state(above).is_air());
    assert!(!driver.world().has_block_entity(above));

    driver.tick();
    assert_eq!(ticks.load(Ordering::SeqCst), 0);
}

#[test]
fn test_approved_block_entity_add_ticks() {
    let ticks = Arc::new(AtomicUsize::new(0));
    let mut driver = builder_driver(&ticks, false);

    assert_eq!(driver.tick().committed, 1);
    assert!(driver.world().has_block_entity(BlockPos::new(0, 1, 0)));
    assert_eq!(ticks.load(Ordering::SeqCst), 1);
}

#[test]
fn test_vetoed_block_entity_removal_keeps_ticking() {
    let ticks = Arc::new(AtomicUsize::new(0));
    let pos = BlockPos::new(3, 0, 3);

    let mut vetoing = redstone_driver();
    vetoing.world_mut().add_block_entity(pos, Box::new(SelfRemoving { ticks: ticks.clone() }));
    vetoing.set_gate(|_cause: &CauseFrame, _batch: &[CaptureRecord]| Decision::Veto);
    assert_eq!(vetoing.tick().vetoed, 1);
    assert!(vetoing.world().has_block_entity(pos));
    vetoing.tick();
    assert_eq!(ticks.load(Ordering::SeqCst), 2);

    let approving_ticks = Arc::new(AtomicUsize::new(0));
    let mut approving = redstone_driver();
    approving.world_mut().add_block_entity(
        pos,
        Box::new(SelfRemoving {
            ticks: approving_ticks.clone(),
        }),
    );
    assert_eq!(approving.tick().committed, 1);
    assert!(!approving.world().has_block_entity(pos));
    approving.tick();
    assert_eq!(approving_ticks.load(Ordering::SeqCst), 1);
    assert_eq!(approving.world().block_entity_count(), 0);
}

#[test]
fn test_scheduled_tick_restores_stamped_block_entity() {
    let mut driver = redstone_driver();
    let relay = BlockPos::new(0, 0, 0);
    let lamp = BlockPos::new(5, 0, 0);
    let user = Uuid::from_u128(0x77);
    driver
        .world_mut()
        .set_block(lamp, LampBlock::state().with_flag(POWERED, true));
    driver.world_mut().add_block_entity(
        relay,
        Box::new(Relay {
            lamp,
            user,
            fired: false,
        }),
    );

    let causes = Arc::new(Mutex::new(Vec::new()));
    let sink = causes.clone();
    driver.set_gate(move |_cause: &CauseFrame, batch: &[CaptureRecord]| {
        sink.lock()
            .expect("gate sink")
            .extend(batch.iter().map(|record| record.cause));
        Decision::Approve
    });

    driver.tick();
    assert_eq!(driver.get_scheduled(lamp).len(), 1);
    let summary = driver.tick();
    assert_eq!(summary.scheduled_run, 1);
    assert!(!driver.world().block_state(lamp).flag(POWERED));

    let causes = causes.lock().expect("gate sink");
    assert_eq!(causes.len(), 1);
    assert_eq!(causes[0].ticking_block, Some((lamp, LAMP)));
    assert_eq!(causes[0].ticking_block_entity, Some(relay));
    assert_eq!(causes[0].notifier, Some(user));
}

#[test]
fn test_partial_approve_on_one_target() {
    let x = BlockPos::new(0, 0, 0);
    let first = BlockState::new(BlockId(1), 0);
    let second = BlockState::new(BlockId(2), 0);

    for (approved, expected) in [(0, first), (1, second)] {
        let mut driver = scripted_driver(vec![(x, first), (x, second)], false);
        driver.set_gate(move |_cause: &CauseFrame, batch: &[CaptureRecord]| {
            assert_eq!(batch.len(), 2);
            Decision::PartialApprove(vec![approved])
        });

        driver.add_scheduled(BlockPos::new(0, -1, 0), 0, 0);
        assert_eq!(driver.tick().partially_approved, 1);
        assert_eq!(driver.world().block_state(x), expected, "approving record {approved}");
    }
}

fn block_map(blocks: &[(BlockPos, BlockState)]) -> BTreeMap<(i32, i32, i32), BlockState> {
    blocks
        .iter()
        .map(|(pos, state)| ((pos.0.x, pos.0.y, pos.0.z), *state))
        .collect()
}

fn arb_writes() -> impl Strategy<Value = Vec<(BlockPos, BlockState)>> {
    prop::collection::vec(
        ((0i32..4, 0i32..4), 0u16..4, 0u8..4).prop_map(|((x, z), block, data)| {
            (BlockPos::new(x, 0, z), BlockState::new(BlockId(block), data))
        }),
        0..24,
    )
}

proptest! {
    #[test]
    fn prop_veto_restores_world(
        initial in arb_writes(),
        writes in arb_writes(),
    ) {
        let mut driver = scripted_driver(writes, false);
        for (pos, state) in &initial {
            driver.world_mut().set_block(*pos, *state);
        }
        driver.set_gate(|_cause: &CauseFrame, _batch: &[CaptureRecord]| Decision::Veto);
        let before = sorted_blocks(&driver);

        driver.add_scheduled(BlockPos::new(0, -1, 0), 0, 0);
        let summary = driver.tick();

        prop_assert!(summary.crashes.is_empty());
        prop_assert_eq!(sorted_blocks(&driver), before);
    }

    #[test]
    fn prop_partial_approve_keeps_approved(
        initial in arb_writes(),
        writes in arb_writes(),
        keep in prop::collection::vec(any::<bool>(), 1..24),
    ) {
        let mut driver = scripted_driver(writes, false);
        for (pos, state) in &initial {
            driver.world_mut().set_block(*pos, *state);
        }
        let before = sorted_blocks(&driver);

        let seen = Arc::new(Mutex::new(None));
        let sink = seen.clone();
        driver.set_gate(move |_cause: &CauseFrame, batch: &[CaptureRecord]| {
            let approved: Vec<usize> = (0..batch.len()).filter(|i| keep[i % keep.len()]).collect();
            *sink.lock().expect("gate sink") = Some((batch.to_vec(), approved.clone()));
            Decision::PartialApprove(approved)
        });

        driver.add_scheduled(BlockPos::new(0, -1, 0), 0, 0);
        let summary = driver.tick();
        prop_assert!(summary.crashes.is_empty());

        // Each target ends at its last approved state, or where it started.
        let mut expected = block_map(&before);
        if let Some((batch, approved)) = seen.lock().expect("gate sink").take() {
            for index in approved {
                if let (CaptureTarget::Block(pos), CapturedState::Block(state)) = (batch[index].target, batch[index].after) {
                    let key = (pos.0.x, pos.0.y, pos.0.z);
                    if state.is_air() {
                        expected.remove(&key);
                    } else {
                        expected.insert(key, state);
                    }
                }
            }
        }
        prop_assert_eq!(block_map(&sorted_blocks(&driver)), expected);
    }

    #[test]
    fn prop_cause_depth_returns_to_baseline(
        writes in arb_writes(),
        fail in any::<bool>(),
        veto in any::<bool>(),
    ) {
        let mut driver = scripted_driver(writes, fail);
        driver.set_gate(move |_cause: &CauseFrame, _batch: &[CaptureRecord]| {
            if veto { Decision::Veto } else { Decision::Approve }
        });
        let before = sorted_blocks(&driver);

        driver.add_scheduled(BlockPos::new(0, -1, 0), 0, 0);
        let summary = driver.tick();

        prop_assert!(driver.current_cause().is_empty());
        prop_assert_eq!(summary.crashes.len(), usize::from(fail));
        if fail {
            prop_assert_eq!(sorted_blocks(&driver), before);
        }
        // A second tick runs cleanly on top of whatever state the first left.
        driver.tick();
        prop_assert!(driver.current_cause().is_empty());
    }
}
