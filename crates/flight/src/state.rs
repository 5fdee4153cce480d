use std::fmt;

/// Phase of the flight. Every step of the plan belongs to one of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FlightState {
    Idle,
    Connecting,
    TakingOff,
    Hovering,
    RotatingYaw,
    LegForward,
    LegRight,
    LegBack,
    LegLeft,
    HoveringFinal,
    Landing,
    Disarming,
    Terminal,
    Aborted,
}

impl fmt::Display for FlightState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FlightState::Idle => "idle",
            FlightState::Connecting => "connecting",
            FlightState::TakingOff => "taking off",
            FlightState::Hovering => "hovering",
            FlightState::RotatingYaw => "rotating yaw",
            FlightState::LegForward => "leg forward",
            FlightState::LegRight => "leg right",
            FlightState::LegBack => "leg back",
            FlightState::LegLeft => "leg left",
            FlightState::HoveringFinal => "final hover",
            FlightState::Landing => "landing",
            FlightState::Disarming => "disarming",
            FlightState::Terminal => "terminal",
            FlightState::Aborted => "aborted",
        };

        f.write_str(name)
    }
}
