//! Reactor banks and multiports: each bank member observes its stable
//! index, and a fixed-width input bank collects one value per channel.

use gyre::prelude::*;

#[derive(Debug, Default)]
struct Collect {
    got: [Option<usize>; 3],
}

#[test]
fn bank_indices_and_multiport() {
    let mut app = App::new("app", Config::default());

    app.reactor("cluster", (), |asm| {
        let members = asm.bank(
            "worker",
            3,
            |_idx| (),
            |asm, _idx| {
                let out = asm.output::<usize>("value")?;
                let startup = asm.startup();
                asm.reaction(Some("emit"))
                    .with_trigger(startup)
                    .with_effect(out)
                    .with_body(move |ctx, _state: &mut ()| {
                        let idx = ctx.bank_index().expect("bank member has an index");
                        ctx.set(out, idx)?;
                        Ok(())
                    })
                    .finish()?;
                Ok(out)
            },
        )?;

        let (_, slots) = asm.child("collect", Collect::default(), |asm| {
            let slots = asm.input_bank::<usize>("slot", 3)?;
            let view = slots.clone();
            let mut builder = asm.reaction(Some("gather"));
            for channel in slots.iter() {
                builder = builder.with_trigger(channel);
            }
            builder
                .with_body(move |ctx, state: &mut Collect| {
                    for (i, channel) in view.iter().enumerate() {
                        if let Some(v) = ctx.get(channel) {
                            state.got[i] = Some(v);
                        }
                    }
                    Ok(())
                })
                .finish()?;
            Ok(slots)
        })?;

        for (i, (_, out)) in members.iter().enumerate() {
            asm.connect(*out, slots.channel(i))?;
        }
        Ok(())
    })
    .unwrap();

    let env = app.run().unwrap();

    // bank indices are exactly 0..width-1, observable in each member's fqn
    for idx in 0..3 {
        assert!(env.find_reactor_by_name(&format!("worker[{idx}]")).is_some());
    }

    let state = env
        .find_reactor_by_name("collect")
        .and_then(|r| r.get_state::<Collect>())
        .unwrap();
    assert_eq!(state.got, [Some(0), Some(1), Some(2)]);
}
