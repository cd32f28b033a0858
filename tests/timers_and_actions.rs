//! Timer boundary behavior, zero-delay action microsteps, minimum
//! inter-arrival enforcement, and the cooperative stop.

use gyre::prelude::*;

#[derive(Debug, Default)]
struct Counter {
    fired: u32,
}

/// A timer with `period = 0` fires exactly once, at `start + offset`.
#[test]
fn one_shot_timer() {
    let mut app = App::new("app", Config::default());

    app.reactor("once", Counter::default(), |asm| {
        let t = asm.timer("t", Duration::from_millis(1), Duration::ZERO)?;
        asm.reaction(Some("count"))
            .with_trigger(t)
            .with_body(move |ctx, state: &mut Counter| {
                assert_eq!(
                    ctx.get_tag(),
                    Tag::new(Duration::from_millis(1), 0)
                );
                state.fired += 1;
                Ok(())
            })
            .finish()?;
        Ok(())
    })
    .unwrap();

    let env = app.run().unwrap();
    assert_eq!(
        env.find_reactor_by_name("once")
            .and_then(|r| r.get_state::<Counter>())
            .unwrap()
            .fired,
        1
    );
}

/// A periodic timer is re-fired until the configured timeout, skipping
/// occurrences that would miss it.
#[test]
fn periodic_timer_until_timeout() {
    let mut app = App::new(
        "app",
        Config::default().with_timeout(Duration::from_millis(5)),
    );

    app.reactor("tick", Counter::default(), |asm| {
        let t = asm.timer("t", Duration::ZERO, Duration::from_millis(1))?;
        asm.reaction(Some("count"))
            .with_trigger(t)
            .with_body(|_ctx, state: &mut Counter| {
                state.fired += 1;
                Ok(())
            })
            .finish()?;
        Ok(())
    })
    .unwrap();

    let env = app.run().unwrap();
    // fires at 0,1,2,3,4,5 ms
    assert_eq!(
        env.find_reactor_by_name("tick")
            .and_then(|r| r.get_state::<Counter>())
            .unwrap()
            .fired,
        6
    );
}

#[derive(Debug, Default)]
struct MicrostepProbe {
    saw_microstep: Option<usize>,
}

/// An action scheduled with zero delay at `(t, m)` arrives at `(t, m + 1)`.
#[test]
fn zero_delay_action_bumps_microstep() {
    let mut app = App::new("app", Config::default());

    app.reactor("stepper", MicrostepProbe::default(), |asm| {
        let act = asm.logical_action::<u32>("act", None)?;
        let startup = asm.startup();

        asm.reaction(Some("kick"))
            .with_trigger(startup)
            .with_schedulable(act)
            .with_body(move |ctx, _state: &mut MicrostepProbe| {
                assert_eq!(ctx.get_tag(), Tag::new(Duration::ZERO, 0));
                ctx.schedule(act, Some(99), None)?;
                Ok(())
            })
            .finish()?;

        asm.reaction(Some("land"))
            .with_trigger(act)
            .with_body(move |ctx, state: &mut MicrostepProbe| {
                assert_eq!(ctx.get_action(act), Some(99));
                state.saw_microstep = Some(ctx.get_tag().microstep());
                Ok(())
            })
            .finish()?;
        Ok(())
    })
    .unwrap();

    let env = app.run().unwrap();
    assert_eq!(
        env.find_reactor_by_name("stepper")
            .and_then(|r| r.get_state::<MicrostepProbe>())
            .unwrap()
            .saw_microstep,
        Some(1)
    );
}

#[derive(Debug, Default)]
struct SpacedProbe {
    arrivals: Vec<Tag>,
}

/// Two schedules closer together than the action's minimum inter-arrival
/// time are spread out to the spacing.
#[test]
fn min_spacing_defers_events() {
    let mut app = App::new("app", Config::default());

    app.reactor("spaced", SpacedProbe::default(), |asm| {
        let act =
            asm.logical_action_spaced::<u32>("act", None, Duration::from_millis(10))?;
        let startup = asm.startup();

        asm.reaction(Some("burst"))
            .with_trigger(startup)
            .with_schedulable(act)
            .with_body(move |ctx, _state: &mut SpacedProbe| {
                ctx.schedule(act, Some(1), Some(Duration::from_millis(1)))?;
                ctx.schedule(act, Some(2), Some(Duration::from_millis(2)))?;
                Ok(())
            })
            .finish()?;

        asm.reaction(Some("record"))
            .with_trigger(act)
            .with_body(move |ctx, state: &mut SpacedProbe| {
                state.arrivals.push(ctx.get_tag());
                Ok(())
            })
            .finish()?;
        Ok(())
    })
    .unwrap();

    let env = app.run().unwrap();
    let arrivals = &env
        .find_reactor_by_name("spaced")
        .and_then(|r| r.get_state::<SpacedProbe>())
        .unwrap()
        .arrivals;
    assert_eq!(
        arrivals.as_slice(),
        &[
            Tag::new(Duration::from_millis(1), 0),
            Tag::new(Duration::from_millis(11), 0),
        ]
    );
}

#[derive(Debug, Default)]
struct StopProbe {
    fired: u32,
    shutdown_seen: bool,
}

/// `request_stop` halts at the end of the current tag; later events are
/// discarded but shutdown reactions still run.
#[test]
fn request_stop_discards_later_events() {
    let mut app = App::new("app", Config::default());

    app.reactor("stopper", StopProbe::default(), |asm| {
        let t = asm.timer("t", Duration::ZERO, Duration::from_millis(1))?;
        let shutdown = asm.shutdown();

        asm.reaction(Some("count"))
            .with_trigger(t)
            .with_body(|ctx, state: &mut StopProbe| {
                state.fired += 1;
                if state.fired == 3 {
                    ctx.request_stop();
                }
                Ok(())
            })
            .finish()?;

        asm.reaction(Some("wind_down"))
            .with_trigger(shutdown)
            .with_body(|_ctx, state: &mut StopProbe| {
                state.shutdown_seen = true;
                Ok(())
            })
            .finish()?;
        Ok(())
    })
    .unwrap();

    let env = app.run().unwrap();
    let state = env
        .find_reactor_by_name("stopper")
        .and_then(|r| r.get_state::<StopProbe>())
        .unwrap();
    assert_eq!(state.fired, 3);
    assert!(state.shutdown_seen);
}
