//! 着色迁移的守卫检查与发生.
use rand::seq::SliceRandom;

use crate::color::binding::{self, Selection, Withdrawal};
use crate::color::token::{Token, TokenBag};
use crate::color::value::Value;
use crate::color::ColorError;
use crate::formula::{evaluate_guard, EvalMode, Expr, SymbolTable};
use crate::net::events::{Direction, NetEvent};
use crate::net::ids::{PlaceId, TransitionId};
use crate::net::index_vec::Idx;
use crate::net::matrices::Dirty;
use crate::net::structure::ArcKind;
use crate::net::undo::PlaceSnapshot;
use crate::net::{Net, NetError};

/// One normal arc between a colored transition and a place.
#[derive(Debug, Clone)]
struct ArcEnd {
    place: PlaceId,
    variable: String,
}

/// What an accepted binding does once committed.
struct Accepted {
    withdrawal: Withdrawal,
    produced: Vec<(PlaceId, Token)>,
}

impl Net {
    /// Input and output arc ends of `transition`, in arc order.
    fn colored_ends(&self, transition: TransitionId) -> (Vec<ArcEnd>, Vec<ArcEnd>) {
        let id = &self.transitions[transition].id;
        let mut inputs = Vec::new();
        let mut outputs = Vec::new();
        for arc in self.arcs.iter().filter(|arc| arc.kind == ArcKind::Normal) {
            let (place_id, list) = if arc.target.eq_ignore_ascii_case(id) {
                (&arc.source, &mut inputs)
            } else if arc.source.eq_ignore_ascii_case(id) {
                (&arc.target, &mut outputs)
            } else {
                continue;
            };
            let Some(place) = self.place_index(place_id) else {
                log::warn!("arc {} references a missing place {place_id}, skipped", arc.id);
                continue;
            };
            let variable = arc
                .variable
                .clone()
                .unwrap_or_else(|| self.places[place].name.clone());
            list.push(ArcEnd { place, variable });
        }
        (inputs, outputs)
    }

    fn bag_of(&self, place: PlaceId) -> Result<&TokenBag, ColorError> {
        let place = &self.places[place];
        place.tokens.as_ref().ok_or_else(|| ColorError::NotColored {
            place: place.id.clone(),
        })
    }

    /// Tries the candidate bindings of `transition` in enumeration order and
    /// fires with the first one whose guard holds.
    ///
    /// Returns `Ok(false)` when the transition has an empty input place or no
    /// binding satisfies the guard; nothing changes in that case. A guard
    /// syntax error is returned straight away. Evaluation errors only skip
    /// the binding, unless every examined binding failed that way.
    pub fn check_and_fire(&mut self, transition: TransitionId) -> Result<bool, NetError> {
        if transition.index() >= self.transitions.len() {
            return Err(NetError::UnknownTransition(transition));
        }
        let (inputs, outputs) = self.colored_ends(transition);
        let guard = match &self.transitions[transition].formula {
            Some(formula) => Some(formula.shared()?),
            None => None,
        };

        let Some(accepted) = self.find_binding(transition, &inputs, &outputs, guard.as_deref())?
        else {
            return Ok(false);
        };
        self.commit(transition, &inputs, &outputs, accepted);
        Ok(true)
    }

    fn find_binding(
        &self,
        transition: TransitionId,
        inputs: &[ArcEnd],
        outputs: &[ArcEnd],
        guard: Option<&Expr>,
    ) -> Result<Option<Accepted>, NetError> {
        let in_bags = inputs
            .iter()
            .map(|end| self.bag_of(end.place))
            .collect::<Result<Vec<_>, _>>()?;
        let out_bags = outputs
            .iter()
            .map(|end| self.bag_of(end.place))
            .collect::<Result<Vec<_>, _>>()?;
        if in_bags.iter().any(|bag| bag.is_empty()) {
            log::debug!(
                "{} has an empty input place",
                self.transitions[transition].id
            );
            return Ok(None);
        }

        let per_place = in_bags.iter().map(|bag| binding::candidates(bag)).collect();
        let mut examined = 0usize;
        let mut failures = 0usize;
        let mut last_error = None;

        for selections in binding::enumerate(per_place, self.config.binding_limit) {
            examined += 1;
            let held = inputs
                .iter()
                .zip(&in_bags)
                .map(|(end, bag)| (end.place, *bag));
            let Some(withdrawal) = Withdrawal::plan(held, &selections) else {
                log::debug!("binding {selections:?} cannot be withdrawn, skipped");
                continue;
            };

            let symbols = || {
                let mut symbols = SymbolTable::new();
                for ((end, bag), selection) in inputs.iter().zip(&in_bags).zip(&selections) {
                    let value = match selection {
                        Selection::Index(idx) => bag.get(*idx).map(Token::to_value),
                        Selection::All => Some(bag.to_set_value()),
                    };
                    if let Some(value) = value {
                        symbols.bind(end.variable.clone(), value);
                    }
                }
                for end in outputs {
                    symbols.declare_output(end.variable.clone());
                }
                symbols
            };

            let Some(guard) = guard else {
                let produced = self.produce(transition, outputs, &out_bags, &symbols())?;
                return Ok(Some(Accepted {
                    withdrawal,
                    produced,
                }));
            };

            match evaluate_guard(guard, &mut symbols(), EvalMode::Check) {
                Ok(false) => continue,
                Ok(true) => {}
                Err(err) => {
                    log::debug!("binding {selections:?} skipped: {err}");
                    failures += 1;
                    last_error = Some(err);
                    continue;
                }
            }

            let mut applied = symbols();
            match evaluate_guard(guard, &mut applied, EvalMode::Apply) {
                Ok(true) => {
                    let produced = self.produce(transition, outputs, &out_bags, &applied)?;
                    return Ok(Some(Accepted {
                        withdrawal,
                        produced,
                    }));
                }
                Ok(false) => continue,
                Err(err) => {
                    failures += 1;
                    last_error = Some(err);
                }
            }
        }

        match last_error {
            Some(err) if failures == examined => Err(err.into()),
            _ => Ok(None),
        }
    }

    /// Tokens the applied symbol table deposits into each output place,
    /// checked against the place's data type.
    fn produce(
        &self,
        transition: TransitionId,
        outputs: &[ArcEnd],
        out_bags: &[&TokenBag],
        symbols: &SymbolTable,
    ) -> Result<Vec<(PlaceId, Token)>, ColorError> {
        let mut produced = Vec::new();
        for (end, bag) in outputs.iter().zip(out_bags) {
            let Some(value) = symbols.output(&end.variable) else {
                continue;
            };
            let values = match value {
                Value::Set(items) if bag.is_powerset() => items.clone(),
                other => vec![other.clone()],
            };
            for value in values {
                let token = Token::from_value(value.clone(), bag.data_type().arity());
                if bag.check(&token).is_err() {
                    return Err(ColorError::ProducedMismatch {
                        transition: self.transitions[transition].id.clone(),
                        variable: end.variable.clone(),
                        value: value.to_string(),
                        data_type: bag.data_type().name.clone(),
                    });
                }
                produced.push((end.place, token));
            }
        }
        Ok(produced)
    }

    fn commit(
        &mut self,
        transition: TransitionId,
        inputs: &[ArcEnd],
        outputs: &[ArcEnd],
        accepted: Accepted,
    ) {
        let mut touched: Vec<PlaceId> = Vec::new();
        for end in inputs.iter().chain(outputs) {
            if !touched.contains(&end.place) {
                touched.push(end.place);
            }
        }
        let entry = touched
            .iter()
            .map(|place| PlaceSnapshot {
                place_id: self.places[*place].id.clone(),
                place: self.places[*place].clone(),
            })
            .collect();
        self.undo.push(entry);

        accepted.withdrawal.commit(&mut self.places);
        for (place, token) in accepted.produced {
            let Some(bag) = self.places[place].tokens.as_mut() else {
                continue;
            };
            if let Err(err) = bag.add(token) {
                log::warn!("produced token dropped: {err}");
            }
        }

        for place in touched {
            let id = self.places[place].id.clone();
            self.after_token_change(&id);
        }
        self.matrices.invalidate(Dirty::CURRENT_MARKING);
        let id = self.transitions[transition].id.clone();
        log::debug!("fired colored transition {id}");
        self.emit_with(|| NetEvent::Fired {
            transition: id,
            direction: Direction::Forward,
        });
    }

    /// Visits the transitions in shuffled order and fires the first one that
    /// has a satisfying binding.
    pub fn fire_random_colored(&mut self) -> Result<Option<TransitionId>, NetError> {
        let mut order: Vec<TransitionId> = self.transitions.indices().collect();
        order.shuffle(&mut self.rng);
        for transition in order {
            if self.check_and_fire(transition)? {
                return Ok(Some(transition));
            }
        }
        Ok(None)
    }
}
