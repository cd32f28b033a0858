//! Connection validity rules exercised from inside mutations: cycle
//! rejection, direct-feedthrough rejection, outside-container rejection,
//! destination-occupied, and the connect/disconnect round-trip.

use gyre::prelude::*;

#[derive(Debug, Default)]
struct Probe {
    cycle_rejected: bool,
    can_connect_agreed: bool,
}

/// Inside a mutation, `connect(out1, in1)` on a reactor whose reaction maps
/// `in1 -> out1` must fail with `CycleIntroduced`, leaving the graph
/// untouched.
#[test]
fn cycle_rejection() {
    let mut app = App::new("app", Config::default());

    app.reactor("r2", Probe::default(), |asm| {
        let in1 = asm.input::<u32>("in1")?;
        let out1 = asm.output::<u32>("out1")?;
        let startup = asm.startup();

        asm.reaction(Some("relay"))
            .with_trigger(in1)
            .with_effect(out1)
            .with_body(move |ctx, _state: &mut Probe| {
                if let Some(v) = ctx.get(in1) {
                    ctx.set(out1, v)?;
                }
                Ok(())
            })
            .finish()?;

        asm.mutation(Some("probe"))
            .with_trigger(startup)
            .with_mutation_body(move |ctx, state: &mut Probe| {
                state.can_connect_agreed = !ctx.can_connect(out1, in1);
                state.cycle_rejected = matches!(
                    ctx.connect(out1, in1),
                    Err(RuntimeError::CycleIntroduced { .. })
                );
                Ok(())
            })
            .finish()?;

        Ok(())
    })
    .unwrap();

    let env = app.run().unwrap();
    let state = env
        .find_reactor_by_name("r2")
        .and_then(|r| r.get_state::<Probe>())
        .unwrap();
    assert!(state.cycle_rejected);
    assert!(state.can_connect_agreed, "can_connect mirrors connect");
}

#[derive(Debug, Default)]
struct FtProbe {
    pass_through_ok: bool,
    feedthrough_rejected: bool,
}

/// `connect(in1, out2)` inside the owning reactor is legal pass-through
/// wiring unless the output already reaches the input, in which case it is
/// `DirectFeedThrough`.
#[test]
fn feedthrough_rejection() {
    let mut app = App::new("app", Config::default());

    // plain case: out2 goes nowhere, so the pass-through is permitted
    app.reactor("plain", FtProbe::default(), |asm| {
        let in1 = asm.input::<u32>("in1")?;
        let out2 = asm.output::<u32>("out2")?;
        let startup = asm.startup();

        asm.reaction(Some("observe"))
            .with_trigger(in1)
            .with_body(|_ctx, _state: &mut FtProbe| Ok(()))
            .finish()?;

        asm.mutation(Some("wire"))
            .with_trigger(startup)
            .with_mutation_body(move |ctx, state: &mut FtProbe| {
                state.pass_through_ok = ctx.connect(in1, out2).is_ok();
                Ok(())
            })
            .finish()?;

        Ok(())
    })
    .unwrap();

    // looped case: out2 feeds a sibling whose output returns to in1, so the
    // pass-through would close a zero-delay loop
    let (_, (in1, out2)) = app
        .reactor("looped", FtProbe::default(), |asm| {
            let in1 = asm.input::<u32>("in1")?;
            let out2 = asm.output::<u32>("out2")?;
            let startup = asm.startup();

            asm.mutation(Some("wire"))
                .with_trigger(startup)
                .with_mutation_body(move |ctx, state: &mut FtProbe| {
                    state.feedthrough_rejected = matches!(
                        ctx.connect(in1, out2),
                        Err(RuntimeError::DirectFeedThrough { .. })
                    );
                    Ok(())
                })
                .finish()?;

            Ok((in1, out2))
        })
        .unwrap();

    let (_, (echo_in, echo_out)) = app
        .reactor("echo", (), |asm| {
            let input = asm.input::<u32>("in")?;
            let out = asm.output::<u32>("out")?;
            asm.reaction(Some("echo"))
                .with_trigger(input)
                .with_effect(out)
                .with_body(move |ctx, _state: &mut ()| {
                    if let Some(v) = ctx.get(input) {
                        ctx.set(out, v)?;
                    }
                    Ok(())
                })
                .finish()?;
            Ok((input, out))
        })
        .unwrap();

    app.connect(out2, echo_in).unwrap();
    app.connect(echo_out, in1).unwrap();

    let env = app.run().unwrap();
    assert!(env
        .find_reactor_by_name("plain")
        .and_then(|r| r.get_state::<FtProbe>())
        .unwrap()
        .pass_through_ok);
    assert!(env
        .find_reactor_by_name("looped")
        .and_then(|r| r.get_state::<FtProbe>())
        .unwrap()
        .feedthrough_rejected);
}

#[derive(Debug, Default)]
struct OutsideProbe {
    rejected: bool,
}

/// A mutation may not wire two ports that both belong to foreign siblings.
#[test]
fn outside_container_rejection() {
    let mut app = App::new("app", Config::default());

    let (_, s1_out) = app
        .reactor("s1", (), |asm| asm.output::<u32>("out"))
        .unwrap();
    let (_, s2_in) = app
        .reactor("s2", (), |asm| asm.input::<u32>("in"))
        .unwrap();

    app.reactor("r", OutsideProbe::default(), |asm| {
        let startup = asm.startup();
        asm.mutation(Some("meddle"))
            .with_trigger(startup)
            .with_mutation_body(move |ctx, state: &mut OutsideProbe| {
                state.rejected = matches!(
                    ctx.connect(s1_out, s2_in),
                    Err(RuntimeError::OutsideContainer { .. })
                );
                assert!(!ctx.can_connect(s1_out, s2_in));
                Ok(())
            })
            .finish()?;
        Ok(())
    })
    .unwrap();

    let env = app.run().unwrap();
    assert!(env
        .find_reactor_by_name("r")
        .and_then(|r| r.get_state::<OutsideProbe>())
        .unwrap()
        .rejected);
}

#[derive(Debug, Default)]
struct OccupiedProbe {
    occupied: bool,
    roundtrip_ok: bool,
}

/// Connecting a second source to a wired port fails with
/// `DestinationOccupied`; disconnect restores the pre-state and repeating
/// it is a no-op.
#[test]
fn destination_occupied_and_roundtrip() {
    let mut app = App::new("app", Config::default());

    let (_, sink_in) = app
        .reactor("sink", (), |asm| asm.input::<u32>("in"))
        .unwrap();

    app.reactor("a", OccupiedProbe::default(), |asm| {
        let out1 = asm.output::<u32>("out1")?;
        let out2 = asm.output::<u32>("out2")?;
        let startup = asm.startup();

        asm.mutation(Some("rewire"))
            .with_trigger(startup)
            .with_mutation_body(move |ctx, state: &mut OccupiedProbe| {
                ctx.connect(out1, sink_in)?;
                state.occupied = matches!(
                    ctx.connect(out2, sink_in),
                    Err(RuntimeError::DestinationOccupied { .. })
                );

                ctx.disconnect(out1, sink_in)?;
                // disconnecting an absent binding is a no-op
                ctx.disconnect(out1, sink_in)?;
                state.roundtrip_ok = ctx.can_connect(out2, sink_in);
                ctx.connect(out2, sink_in)?;
                Ok(())
            })
            .finish()?;
        Ok(())
    })
    .unwrap();

    let env = app.run().unwrap();
    let state = env
        .find_reactor_by_name("a")
        .and_then(|r| r.get_state::<OccupiedProbe>())
        .unwrap();
    assert!(state.occupied);
    assert!(state.roundtrip_ok);
}

#[derive(Debug, Default)]
struct FailProbe;

/// A failed mutation is rolled back wholesale and surfaces through the
/// app's `fail` callback.
#[test]
fn failed_mutation_rolls_back() {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    let failed = Arc::new(AtomicBool::new(false));
    let observed = failed.clone();

    let mut app = App::new("app", Config::default())
        .with_fail(move |_err| observed.store(true, Ordering::Relaxed));

    let (_, s1_out) = app
        .reactor("s1", (), |asm| asm.output::<u32>("out"))
        .unwrap();
    let (_, s2_in) = app
        .reactor("s2", (), |asm| asm.input::<u32>("in"))
        .unwrap();

    app.reactor("r", FailProbe, |asm| {
        let own_out = asm.output::<u32>("out")?;
        let startup = asm.startup();
        asm.mutation(Some("doomed"))
            .with_trigger(startup)
            .with_mutation_body(move |ctx, _state: &mut FailProbe| {
                // the first connect succeeds, then the foreign wiring fails:
                // both must be rolled back
                ctx.connect(own_out, s2_in)?;
                ctx.connect(s1_out, s2_in)?;
                Ok(())
            })
            .finish()?;
        Ok(())
    })
    .unwrap();

    let err = app.run().unwrap_err();
    assert!(matches!(err, RuntimeError::ReactionFailure { .. }));
    assert!(failed.load(std::sync::atomic::Ordering::Relaxed));
}
