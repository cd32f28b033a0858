//! Local enforcement point for federated scheduling: intended tags must
//! respect the authority's ordering rules.

use gyre::prelude::*;

#[derive(Debug, Default)]
struct FedState {
    rejected_same_tag: bool,
    provisional_same_tag_ok: bool,
    received: Option<u32>,
    received_at: Option<Tag>,
    receive_count: u32,
}

#[test]
fn federated_intended_tags() {
    let mut app = App::new("app", Config::default());

    app.reactor("gateway", FedState::default(), |asm| {
        let inbound = asm.federate_port::<u32>("inbound")?;
        let startup = asm.startup();

        asm.reaction(Some("inject"))
            .with_trigger(startup)
            .with_schedulable(inbound)
            .with_body(move |ctx, state: &mut FedState| {
                let mut authority = TagAuthority::new();

                // a grant-less authority demands strictly increasing tags
                state.rejected_same_tag = matches!(
                    ctx.schedule_federated(inbound, Some(1), ctx.get_tag(), &authority),
                    Err(RuntimeError::FederatedTagViolation { .. })
                );

                // a provisional grant relaxes the rule to greater-or-equal
                authority.record_grant(ctx.get_tag(), true);
                state.provisional_same_tag_ok = ctx
                    .schedule_federated(inbound, Some(2), ctx.get_tag(), &authority)
                    .is_ok();

                let intended = ctx.get_tag().delay(Some(Duration::from_millis(1)))?;
                ctx.schedule_federated(inbound, Some(7), intended, &authority)?;
                Ok(())
            })
            .finish()?;

        asm.reaction(Some("receive"))
            .with_trigger(inbound)
            .with_body(move |ctx, state: &mut FedState| {
                state.received = ctx.get_action(inbound);
                state.received_at = Some(ctx.get_tag());
                state.receive_count += 1;
                Ok(())
            })
            .finish()?;
        Ok(())
    })
    .unwrap();

    let env = app.run().unwrap();
    let state = env
        .find_reactor_by_name("gateway")
        .and_then(|r| r.get_state::<FedState>())
        .unwrap();
    assert!(state.rejected_same_tag);
    assert!(state.provisional_same_tag_ok);
    assert_eq!(state.receive_count, 2, "one same-tag delivery, one future");
    assert_eq!(state.received, Some(7));
    assert_eq!(
        state.received_at,
        Some(Tag::new(Duration::from_millis(1), 0))
    );
}
