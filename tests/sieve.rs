//! The prime sieve: a ramp feeds candidate numbers into a chain of filters
//! that grows itself through mutations. After the run, the filter chain
//! holds exactly the primes up to the bound.

use gyre::prelude::*;
use gyre::keys::ReactorKey;

const UNTIL: u64 = 30;

#[derive(Debug)]
struct RampState {
    next: u64,
}

#[derive(Debug)]
struct FilterState {
    prime: u64,
    next: Option<ReactorKey>,
}

type FilterPorts = (InPort<u64>, OutPort<u64>);

fn filter(asm: &mut Assembler<'_, FilterState>) -> Result<FilterPorts, RuntimeError> {
    let input = asm.input::<u64>("in")?;
    let out = asm.output::<u64>("out")?;

    asm.mutation(Some("sift"))
        .with_trigger(input)
        .with_effect(out)
        .with_mutation_body(move |ctx, state: &mut FilterState| {
            let Some(x) = ctx.get(input) else {
                return Ok(());
            };
            if x % state.prime == 0 {
                return Ok(());
            }
            match state.next {
                // x survived every stored prime: it is prime, and it gets
                // its own filter at the end of the chain
                None => {
                    let (key, (next_in, _)) =
                        ctx.add_sibling(&format!("filter_{x}"), FilterState { prime: x, next: None }, filter)?;
                    ctx.connect(out, next_in)?;
                    state.next = Some(key);
                }
                Some(_) => {
                    ctx.set(out, x)?;
                }
            }
            Ok(())
        })
        .finish()?;

    Ok((input, out))
}

fn primes_up_to(n: u64) -> Vec<u64> {
    (2..=n)
        .filter(|&x| (2..x).all(|d| x % d != 0))
        .collect()
}

#[test]
fn prime_sieve() {
    let mut app = App::new("app", Config::default());

    let (_, ramp_out) = app
        .reactor("ramp", RampState { next: 3 }, |asm| {
            let out = asm.output::<u64>("out")?;
            let tick = asm.timer("tick", Duration::ZERO, Duration::from_nanos(1))?;
            asm.reaction(Some("emit"))
                .with_trigger(tick)
                .with_effect(out)
                .with_body(move |ctx, state: &mut RampState| {
                    if state.next > UNTIL {
                        ctx.request_stop();
                    } else {
                        ctx.set(out, state.next)?;
                        state.next += 1;
                    }
                    Ok(())
                })
                .finish()?;
            Ok(out)
        })
        .unwrap();

    let (_, (first_in, _)) = app
        .reactor("filter_2", FilterState { prime: 2, next: None }, filter)
        .unwrap();
    app.connect(ramp_out, first_in).unwrap();

    let env = app.run().unwrap();

    let mut found: Vec<u64> = env
        .iter_reactors()
        .filter_map(|(_, reactor)| reactor.get_state::<FilterState>())
        .map(|state| state.prime)
        .collect();
    found.sort_unstable();
    assert_eq!(found, primes_up_to(UNTIL));
}
