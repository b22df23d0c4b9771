//! Net construction, change notifications, parameters, configuration and
//! simulation.
use std::sync::{Arc as Shared, Mutex};

use petri_engine::net::{
    Annotation, Arc, Direction, Net, NetError, NetEvent, NetObject, ObjectKind, Parameter,
    ParameterValue, Place, Transition, TransitionId,
};
use petri_engine::{EngineConfig, SimulationConfig, simulate};

fn recorded(net: &mut Net) -> Shared<Mutex<Vec<NetEvent>>> {
    let log = Shared::new(Mutex::new(Vec::new()));
    let sink = Shared::clone(&log);
    net.subscribe(move |event: &NetEvent| {
        if let Ok(mut events) = sink.lock() {
            events.push(event.clone());
        }
    });
    log
}

fn take(log: &Shared<Mutex<Vec<NetEvent>>>) -> Vec<NetEvent> {
    std::mem::take(&mut *log.lock().unwrap())
}

#[test]
fn every_mutation_emits_an_event() {
    let mut net = Net::seeded(0);
    let log = recorded(&mut net);

    net.add_place(Place::new("in").with_marking(1));
    net.add_place(Place::new("out"));
    net.add_transition(Transition::new("t"));
    net.add_arc(Arc::normal("P0", "T0", 1));
    net.add_arc(Arc::normal("T0", "P1", 1));
    let added = take(&log);
    assert_eq!(added.len(), 5);
    assert!(added.iter().all(|e| matches!(e, NetEvent::Added(_))));

    assert!(net.fire(TransitionId::new(0)).unwrap());
    assert_eq!(
        take(&log),
        vec![
            NetEvent::MarkingChanged { place: "P0".into(), marking: 0 },
            NetEvent::MarkingChanged { place: "P1".into(), marking: 1 },
            NetEvent::Fired { transition: "T0".into(), direction: Direction::Forward },
        ]
    );

    assert!(net.fire_backward(TransitionId::new(0)).unwrap());
    assert!(matches!(
        take(&log).last(),
        Some(NetEvent::Fired { direction: Direction::Backward, .. })
    ));
}

#[test]
fn detached_copies_do_not_notify() {
    let mut net = Net::seeded(0);
    let log = recorded(&mut net);
    let mut copy = net.detached();
    assert_eq!((net.listener_count(), copy.listener_count()), (1, 0));
    copy.add_place(Place::new("quiet"));
    assert!(take(&log).is_empty());
    assert_eq!(net.place_count(), 0);
}

#[test]
fn object_dispatch_and_queries() {
    let mut net = Net::seeded(0);
    net.add_object(NetObject::Place(Place::new("Buffer"))).unwrap();
    net.add_object(NetObject::Transition(Transition::new("Put"))).unwrap();
    let inhibitor = net
        .add_object(NetObject::InhibitorArc(Arc::normal("P0", "T0", 1)))
        .unwrap();
    net.add_object(NetObject::Annotation(Annotation::new("a note"))).unwrap();

    assert_eq!(inhibitor, "I0");
    assert!(matches!(net.object("i0"), Some(NetObject::InhibitorArc(_))));
    assert_eq!(net.place_by_name("buffer").map(|p| p.id.as_str()), Some("P0"));
    assert_eq!(net.objects_of_kind(ObjectKind::Annotation).len(), 1);
    assert_eq!(net.inhibition_matrix(), vec![vec![1]]);

    let removed = net.remove_object("T0").unwrap();
    assert_eq!(removed.kind(), ObjectKind::Transition);
    assert!(net.arcs().is_empty());
    assert!(net.remove_object("T0").is_none());
}

#[test]
fn rate_parameter_drives_bound_transitions() {
    let mut net = Net::seeded(0);
    net.add_transition(Transition::new("a"));
    net.add_transition(Transition::new("b"));
    net.add_parameter(Parameter::rate("lambda", 4.0)).unwrap();
    net.bind_rate_parameter("T0", "lambda").unwrap();
    net.bind_rate_parameter("T1", "lambda").unwrap();
    assert_eq!(net.transition("T1").unwrap().rate, 4.0);

    net.set_parameter_value("lambda", ParameterValue::Rate(0.5)).unwrap();
    assert!(net.transitions().iter().all(|t| t.rate == 0.5));

    assert_eq!(
        net.set_parameter_value("lambda", ParameterValue::Marking(1)),
        Err(NetError::ParameterKindMismatch("lambda".into()))
    );
    assert_eq!(
        net.bind_marking_parameter("T0", "lambda"),
        Err(NetError::ParameterKindMismatch("lambda".into()))
    );
    assert_eq!(
        net.set_parameter_value("mu", ParameterValue::Rate(1.0)),
        Err(NetError::UnknownParameter("mu".into()))
    );
}

#[test]
fn place_added_with_bound_parameter_takes_its_value() {
    let mut net = Net::seeded(0);
    net.add_parameter(Parameter::marking("n", 3)).unwrap();
    let mut place = Place::new("pool");
    place.marking_parameter = Some("n".into());
    net.add_place(place);
    assert_eq!(net.initial_marking().as_slice(), &[3]);

    net.add_parameter(Parameter::marking("m", 1)).unwrap();
    assert_eq!(
        net.rename_marking_parameter("n", "m"),
        Err(NetError::ParameterNameTaken("m".into()))
    );
}

#[test]
fn config_drives_seed_and_undo_depth() {
    let config = EngineConfig::from_toml_str("seed = 4\nundo_depth = 1\n").unwrap();
    let build = || {
        let mut net = Net::with_config(config.clone());
        net.add_transition(Transition::new("a"));
        net.add_transition(Transition::new("b").with_rate(2.0));
        net
    };
    let picks = |mut net: Net| {
        (0..20)
            .map(|_| net.pick_random_weighted().unwrap())
            .collect::<Vec<_>>()
    };
    assert_eq!(picks(build()), picks(build()));
    assert_eq!(build().config().undo_depth, Some(1));
}

#[test]
fn config_file_round_trip() {
    let path = std::env::temp_dir().join(format!("petri_engine_{}.toml", std::process::id()));
    std::fs::write(&path, "binding_limit = 64\n[simulation]\nfirings = 5\n").unwrap();
    let config = EngineConfig::load_from_file(&path).unwrap();
    let _ = std::fs::remove_file(&path);
    assert_eq!(config.binding_limit, Some(64));
    assert_eq!(config.simulation.firings, 5);
    assert_eq!(config.simulation.replications, 10);
}

#[test]
fn simulation_of_a_fair_choice() {
    let mut net = Net::seeded(0);
    net.add_place(Place::new("idle").with_marking(1));
    net.add_place(Place::new("busy"));
    net.add_transition(Transition::new("start"));
    net.add_transition(Transition::new("stop"));
    net.add_arc(Arc::normal("P0", "T0", 1));
    net.add_arc(Arc::normal("T0", "P1", 1));
    net.add_arc(Arc::normal("P1", "T1", 1));
    net.add_arc(Arc::normal("T1", "P0", 1));

    let config = SimulationConfig {
        firings: 200,
        replications: 8,
        seed: 1,
    };
    let report = simulate(&net, &config).unwrap();
    let idle = report.place("P0").unwrap().mean;
    let busy = report.place("P1").unwrap().mean;
    assert!((idle + busy - 1.0).abs() < 1e-9);
    assert_eq!(report.firings, 1600);
    assert_eq!(report, simulate(&net, &config).unwrap());
}
