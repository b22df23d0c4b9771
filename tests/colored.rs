//! Colored firing through the public API.
use petri_engine::color::{ComponentKind, DataType, Token, Value};
use petri_engine::net::{Arc, Net, Place, Transition, TransitionId};

const T0: TransitionId = TransitionId::new(0);

fn ints(values: &[i64]) -> Vec<Token> {
    values.iter().map(|v| Token::int(*v)).collect()
}

fn held(net: &Net, place: &str) -> Vec<Token> {
    net.tokens(place).unwrap().iter().cloned().collect()
}

#[test]
fn guard_selects_first_positive_token_and_undo_restores() {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut net = Net::seeded(3);
    net.add_place(
        Place::new("x")
            .with_tokens(DataType::integer("int"), ints(&[1, -1, 3]))
            .unwrap(),
    );
    net.add_transition(Transition::new("positive").with_formula("x > 0"));
    net.add_arc(Arc::normal("P0", "T0", 1));

    assert!(net.check_and_fire(T0).unwrap());
    assert_eq!(held(&net, "P0"), ints(&[-1, 3]));

    let entry = net.pop_undo().expect("colored firing leaves an undo entry");
    net.restore_snapshot(&entry);
    assert_eq!(held(&net, "P0"), ints(&[1, -1, 3]));
}

#[test]
fn bindings_are_tried_depth_first_in_input_order() {
    let mut net = Net::seeded(3);
    let int = DataType::integer("int");
    net.add_place(Place::new("a").with_tokens(int.clone(), ints(&[1, 2])).unwrap());
    net.add_place(Place::new("b").with_tokens(int.clone(), ints(&[10, 20])).unwrap());
    net.add_place(Place::new("sum").with_tokens(int, Vec::new()).unwrap());
    net.add_transition(Transition::new("add").with_formula("a + b > 15 && sum = a + b"));
    net.add_arc(Arc::normal("P0", "T0", 1));
    net.add_arc(Arc::normal("P1", "T0", 1));
    net.add_arc(Arc::normal("T0", "P2", 1));

    assert!(net.check_and_fire(T0).unwrap());
    // (1, 10) fails, (1, 20) is the first binding that holds.
    assert_eq!(held(&net, "P0"), ints(&[2]));
    assert_eq!(held(&net, "P1"), ints(&[10]));
    assert_eq!(held(&net, "P2"), ints(&[21]));
    assert_eq!(net.current_marking().as_slice(), &[1, 1, 1]);
}

#[test]
fn tuple_tokens_and_projection() {
    let pair = DataType::new(
        "pair",
        vec![ComponentKind::Int, ComponentKind::Str],
    );
    let mut net = Net::seeded(3);
    net.add_place(
        Place::new("job")
            .with_tokens(
                pair.clone(),
                vec![
                    Token::new(vec![Value::Int(1), Value::from("low")]),
                    Token::new(vec![Value::Int(9), Value::from("high")]),
                ],
            )
            .unwrap(),
    );
    net.add_place(Place::new("done").with_tokens(pair, Vec::new()).unwrap());
    net.add_transition(
        Transition::new("urgent").with_formula("job[1] = \"high\" && done = (job[0] + 1, job[1])"),
    );
    net.add_arc(Arc::normal("P0", "T0", 1));
    net.add_arc(Arc::normal("T0", "P1", 1));

    assert!(net.check_and_fire(T0).unwrap());
    assert_eq!(
        held(&net, "P1"),
        vec![Token::new(vec![Value::Int(10), Value::from("high")])]
    );
    assert_eq!(held(&net, "P0").len(), 1);
}

#[test]
fn token_edits_track_marking() {
    let mut net = Net::seeded(3);
    net.add_place(
        Place::new("x")
            .with_tokens(DataType::integer("int"), ints(&[4]))
            .unwrap(),
    );
    net.add_token("P0", Token::int(4)).unwrap();
    net.add_token("P0", Token::int(5)).unwrap();
    assert_eq!(net.current_marking().as_slice(), &[3]);
    assert!(net.add_token("P0", Token::str("nope")).is_err());
    assert_eq!(net.remove_token("P0", &Token::int(4)).unwrap(), 2);
    assert_eq!(net.current_marking().as_slice(), &[1]);
}

#[test]
fn fire_random_colored_walks_until_stuck() {
    let mut net = Net::seeded(8);
    let int = DataType::integer("int");
    net.add_place(Place::new("x").with_tokens(int.clone(), ints(&[1, 2, 3])).unwrap());
    net.add_place(Place::new("x").with_tokens(int, Vec::new()).unwrap());
    net.add_transition(Transition::new("move").with_formula("x >= 2"));
    net.add_arc(Arc::normal("P0", "T0", 1));
    net.add_arc(Arc::normal("T0", "P1", 1));

    let mut fired = 0;
    while net.fire_random_colored().unwrap().is_some() {
        fired += 1;
    }
    assert_eq!(fired, 2);
    assert_eq!(held(&net, "P0"), ints(&[1]));
    assert_eq!(held(&net, "P1"), ints(&[2, 3]));
    assert_eq!(net.undo_len(), 2);
}
