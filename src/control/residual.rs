//! Residual dynamics
//!
//! Replays a rollout recorded on arbitrary `f64` dynamics through a
//! differentiable nominal model:
//!
//!   x_{k+1} = f_nom(x_k, u_k) + (x⁺_k − f_nom(x̂_k, û_k))
//!
//! where `(x̂_k, û_k, x⁺_k)` is the recorded transition and the bracket is a
//! constant. The real part of the replay reproduces the recording, the
//! derivative part is that of the nominal model.

use num_dual::Dual64;

use crate::common::{
    ControlAction, Dynamics, NominalDynamics, StepInfo, StepOutcome, TrackingError,
    TrackingResult, VehicleState,
};
use crate::control::Rollout;

fn lift_components(values: Vec<f64>) -> Vec<Dual64> {
    values.into_iter().map(Dual64::from).collect()
}

#[derive(Debug, Clone, PartialEq)]
struct ResidualStep {
    residual: Vec<f64>,
    reward: f64,
    elapsed: f64,
    done: bool,
}

/// Nominal model corrected by the residuals of a recorded rollout
#[derive(Debug)]
pub struct ResidualDynamics<'a, N: NominalDynamics<Dual64>> {
    nominal: &'a N,
    initial_state: N::State,
    steps: Vec<ResidualStep>,
    state: N::State,
    cursor: usize,
}

impl<'a, N: NominalDynamics<Dual64>> ResidualDynamics<'a, N> {
    /// Residuals of `recorded` against `nominal`, one per transition
    pub fn new<S, A>(nominal: &'a N, recorded: &Rollout<f64, S, A>) -> TrackingResult<Self>
    where
        S: VehicleState<f64>,
        A: ControlAction<f64>,
    {
        let initial_state = N::State::from_components(&lift_components(recorded.initial_state.components()))?;

        let mut steps = Vec::with_capacity(recorded.trace.len());
        for tr in &recorded.trace {
            let state = N::State::from_components(&lift_components(tr.state.components()))?;
            let action = N::Action::from_components(&lift_components(tr.action.components()))?;
            let predicted = nominal.propagate(&state, &action).components();
            let observed = tr.next_state.components();
            if predicted.len() != observed.len() {
                return Err(TrackingError::InvalidInput(format!(
                    "nominal state has {} components, recorded state {}",
                    predicted.len(),
                    observed.len()
                )));
            }
            steps.push(ResidualStep {
                residual: observed.iter().zip(&predicted).map(|(o, p)| o - p.re).collect(),
                reward: tr.reward,
                elapsed: tr.elapsed,
                done: tr.done,
            });
        }

        Ok(ResidualDynamics { nominal, initial_state, steps, state: initial_state, cursor: 0 })
    }

    /// Recorded transitions available for replay
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

impl<'a, N: NominalDynamics<Dual64>> Dynamics<Dual64> for ResidualDynamics<'a, N> {
    type State = N::State;
    type Action = N::Action;

    fn reset(&mut self) -> N::State {
        self.cursor = 0;
        self.state = self.initial_state;
        self.state
    }

    fn step(&mut self, action: &N::Action) -> TrackingResult<StepOutcome<Dual64, N::State>> {
        let step = self.steps.get(self.cursor).ok_or_else(|| {
            TrackingError::InvalidInput(format!("residual trace exhausted after {} steps", self.steps.len()))
        })?;

        let next: Vec<Dual64> = self
            .nominal
            .propagate(&self.state, action)
            .components()
            .iter()
            .zip(&step.residual)
            .map(|(&p, &r)| p + Dual64::from(r))
            .collect();
        self.state = N::State::from_components(&next)?;
        self.cursor += 1;

        Ok(StepOutcome {
            state: self.state,
            reward: Dual64::from(step.reward),
            done: step.done,
            info: StepInfo { elapsed: step.elapsed },
        })
    }
}
