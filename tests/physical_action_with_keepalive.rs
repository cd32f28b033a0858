//! A physical action scheduled from another thread wakes a keep-alive
//! scheduler; the receiving reaction stops the app.

use gyre::prelude::*;

#[derive(Debug, Default)]
struct PhysState {
    value: Option<u32>,
}

#[test]
fn physical_action_with_keepalive() {
    tracing_subscriber::fmt::init();

    let mut app = App::new("app", Config::default().with_keep_alive(true));

    let (_, act) = app
        .reactor("phys", PhysState::default(), |asm| {
            let act = asm.physical_action::<u32>("act", None)?;
            asm.reaction(Some("on_act"))
                .with_trigger(act)
                .with_body(move |ctx, state: &mut PhysState| {
                    state.value = ctx.get_action(act);
                    ctx.request_stop();
                    Ok(())
                })
                .finish()?;
            Ok(act)
        })
        .unwrap();

    let scheduler = app.physical_scheduler(act).unwrap();
    let producer = std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(20));
        scheduler.schedule(42, None).unwrap();
    });

    let env = app.run().unwrap();
    producer.join().unwrap();

    assert_eq!(
        env.find_reactor_by_name("phys")
            .and_then(|r| r.get_state::<PhysState>())
            .unwrap()
            .value,
        Some(42)
    );
}

/// Minting a physical scheduler for a logical action is a capability error.
#[test]
fn physical_scheduler_requires_physical_action() {
    let mut app = App::new("app", Config::default());
    let (_, act) = app
        .reactor("r", (), |asm| asm.logical_action::<u32>("act", None))
        .unwrap();
    assert!(matches!(
        app.physical_scheduler(act),
        Err(RuntimeError::InvalidKey { .. })
    ));
}
