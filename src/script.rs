//! Announcement scripts: templates, user inputs and flight-number reading.
//!
//! A broadcast is a script kind plus its fixed text parts. Rendering joins
//! the parts with the (optionally repeated) user inputs, then substitutes
//! the `{flightNumber}` and `{destination}` placeholders.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::ScriptError;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BroadcastConfig {
    pub id: String,
    pub title: String,
    #[serde(flatten)]
    pub script: Script,
}

/// Script template. Part texts may contain placeholders.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Script {
    /// Read as-is.
    Fixed { text: String },
    /// `part1 name, name, part2`
    Name { part1: String, part2: String },
    /// `part1 N번, N번 part2` where part2's first character is the printed "번".
    Numbered { part1: String, part2: String },
    NameAndGate {
        part1: String,
        part2: String,
        part3: String,
    },
    /// Gate moved to `{floor}층 {gate}번`; `{gate}` in part2 is filled too.
    FloorGate { part1: String, part2: String },
    /// `part1 {hour}시 {minute}분 경 입니다. part2`
    Time { part1: String, part2: String },
}

/// Values typed into a broadcast's input fields.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ScriptInputs {
    pub name: String,
    pub gate: String,
    pub floor: String,
    pub hour: String,
    pub minute: String,
    /// Repeat count for the main input. 0 counts as 1.
    pub repeat: u32,
    /// Repeat count for the gate in `name_and_gate`. 0 counts as 1.
    pub gate_repeat: u32,
}

/// What a player reads.
#[derive(Debug, Clone)]
pub enum Source {
    Custom(String),
    Broadcast { id: String, inputs: ScriptInputs },
}

/// Currently selected flight and destination code.
#[derive(Debug, Clone, Default)]
pub struct FlightSelection {
    pub flight: String,
    pub destination: String,
}

fn repeated(value: &str, count: u32) -> String {
    vec![value; count.max(1) as usize].join(", ")
}

/// Text after the first character, trimmed.
fn after_first(text: &str) -> &str {
    let mut chars = text.chars();
    chars.next();
    chars.as_str().trim()
}

impl Script {
    /// Join the template parts with the user inputs.
    pub fn render(&self, inputs: &ScriptInputs) -> Result<String, ScriptError> {
        let text = match self {
            Self::Fixed { text } => text.clone(),
            Self::Name { part1, part2 } => {
                if inputs.name.trim().is_empty() {
                    return Err(ScriptError::EmptyInput);
                }
                format!("{part1} {}, {part2}", repeated(&inputs.name, inputs.repeat))
            }
            Self::Numbered { part1, part2 } => {
                if inputs.name.trim().is_empty() {
                    return Err(ScriptError::EmptyInput);
                }
                let numbered = format!("{}번", inputs.name);
                format!(
                    "{part1} {} {}",
                    repeated(&numbered, inputs.repeat),
                    after_first(part2)
                )
            }
            Self::NameAndGate {
                part1,
                part2,
                part3,
            } => {
                if inputs.name.trim().is_empty() || inputs.gate.trim().is_empty() {
                    return Err(ScriptError::MissingNameAndGate);
                }
                let gate = format!("{}번", inputs.gate);
                format!(
                    "{part1} {}, {part2} {} {}",
                    repeated(&inputs.name, inputs.repeat),
                    repeated(&gate, inputs.gate_repeat),
                    after_first(part3)
                )
            }
            Self::FloorGate { part1, part2 } => {
                if inputs.floor.trim().is_empty() || inputs.gate.trim().is_empty() {
                    return Err(ScriptError::MissingFloorAndGate);
                }
                let location = format!("{}층 {}번", inputs.floor, inputs.gate);
                format!(
                    "{part1} {}으로 변경되었습니다. {}",
                    repeated(&location, inputs.repeat),
                    part2.replace("{gate}", &inputs.gate)
                )
            }
            Self::Time { part1, part2 } => {
                if inputs.hour.trim().is_empty() || inputs.minute.trim().is_empty() {
                    return Err(ScriptError::MissingTime);
                }
                let time = format!("{}시 {}분", inputs.hour, inputs.minute);
                format!("{part1} {} 경 입니다. {part2}", repeated(&time, inputs.repeat))
            }
        };
        Ok(text)
    }
}

/// Korean reading of a flight number: letters by name, digits one by one.
///
/// `"KE123"` → `"케이이, 일, 이, 삼"`.
pub fn read_flight_number(flight: &str) -> String {
    let letters: Vec<&str> = flight
        .chars()
        .filter(char::is_ascii_alphabetic)
        .filter_map(|c| letter_name(c.to_ascii_uppercase()))
        .collect();
    let digits: Vec<&str> = flight
        .chars()
        .filter(char::is_ascii_digit)
        .filter_map(digit_name)
        .collect();

    let mut result = letters.concat();
    if !letters.is_empty() && !digits.is_empty() {
        result.push_str(", ");
    }
    result.push_str(&digits.join(", "));
    result
}

fn letter_name(c: char) -> Option<&'static str> {
    const NAMES: [&str; 26] = [
        "에이", "비", "씨", "디", "이", "에프", "지", "에이치", "아이", "제이", "케이", "엘", "엠",
        "엔", "오", "피", "큐", "알", "에스", "티", "유", "브이", "더블유", "엑스", "와이", "제트",
    ];
    c.is_ascii_uppercase()
        .then(|| NAMES[(c as u8 - b'A') as usize])
}

fn digit_name(c: char) -> Option<&'static str> {
    const NAMES: [&str; 10] = ["공", "일", "이", "삼", "사", "오", "육", "칠", "팔", "구"];
    c.to_digit(10).map(|d| NAMES[d as usize])
}

/// Airport name read aloud, or the code itself when unknown.
pub fn destination_name<'a>(code: &'a str, airports: &'a BTreeMap<String, String>) -> &'a str {
    airports.get(code).map(String::as_str).unwrap_or(code)
}

/// Substitute `{flightNumber}` and `{destination}`.
pub fn fill_placeholders(
    text: &str,
    selection: &FlightSelection,
    airports: &BTreeMap<String, String>,
) -> String {
    text.replace("{flightNumber}", &read_flight_number(&selection.flight))
        .replace("{destination}", destination_name(&selection.destination, airports))
}

/// Build the final text a player should read.
pub fn compose(
    source: &Source,
    broadcasts: &[BroadcastConfig],
    selection: &FlightSelection,
    airports: &BTreeMap<String, String>,
) -> Result<String, ScriptError> {
    let text = match source {
        Source::Custom(text) => {
            if text.trim().is_empty() {
                return Err(ScriptError::EmptyCustomText);
            }
            text.clone()
        }
        Source::Broadcast { id, inputs } => broadcasts
            .iter()
            .find(|b| &b.id == id)
            .ok_or_else(|| ScriptError::UnknownBroadcast(id.clone()))?
            .script
            .render(inputs)?,
    };
    Ok(fill_placeholders(&text, selection, airports))
}

/// Built-in broadcast set used when the config has none.
pub fn default_broadcasts() -> Vec<BroadcastConfig> {
    let broadcast = |id: &str, title: &str, script: Script| BroadcastConfig {
        id: id.into(),
        title: title.into(),
        script,
    };

    vec![
        broadcast(
            "boarding",
            "Boarding",
            Script::Fixed {
                text: "{destination}행 {flightNumber}편을 이용하실 승객 여러분께서는 지금 탑승구에서 탑승해 주시기 바랍니다. \
                       Passengers for {destination}, please board now at the gate."
                    .into(),
            },
        ),
        broadcast(
            "paging",
            "Passenger paging",
            Script::Name {
                part1: "{destination}행 {flightNumber}편으로 출발하시는".into(),
                part2: "승객께서는 가까운 안내 데스크로 와 주시기 바랍니다.".into(),
            },
        ),
        broadcast(
            "gate",
            "Gate notice",
            Script::Numbered {
                part1: "{destination}행 {flightNumber}편 승객께서는".into(),
                part2: "번 탑승구로 와 주시기 바랍니다.".into(),
            },
        ),
        broadcast(
            "final-call",
            "Final call",
            Script::NameAndGate {
                part1: "{destination}행 {flightNumber}편으로 출발하시는".into(),
                part2: "승객께서는 지금 바로".into(),
                part3: "번 탑승구로 와 주시기 바랍니다.".into(),
            },
        ),
        broadcast(
            "gate-change",
            "Gate change",
            Script::FloorGate {
                part1: "{destination}행 {flightNumber}편의 탑승구가".into(),
                part2: "The boarding gate has been changed to gate {gate}.".into(),
            },
        ),
        broadcast(
            "delay",
            "Departure delay",
            Script::Time {
                part1: "{destination}행 {flightNumber}편의 출발 예정 시각은".into(),
                part2: "We apologize for the inconvenience.".into(),
            },
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn airports() -> BTreeMap<String, String> {
        BTreeMap::from([("ICN".to_string(), "인천".to_string())])
    }

    #[test]
    fn test_read_flight_number() {
        assert_eq!(read_flight_number("KE123"), "케이이, 일, 이, 삼");
        assert_eq!(read_flight_number("oz0"), "오제트, 공");
        assert_eq!(read_flight_number("7C1101"), "씨, 칠, 일, 일, 공, 일");
        assert_eq!(read_flight_number("ABC"), "에이비씨");
        assert_eq!(read_flight_number(""), "");
    }

    #[test]
    fn test_destination_falls_back_to_code() {
        let airports = airports();
        assert_eq!(destination_name("ICN", &airports), "인천");
        assert_eq!(destination_name("NRT", &airports), "NRT");
    }

    #[test]
    fn test_name_script_repeats() {
        let script = Script::Name {
            part1: "안내".into(),
            part2: "끝".into(),
        };
        let inputs = ScriptInputs {
            name: "홍길동".into(),
            repeat: 2,
            ..Default::default()
        };
        assert_eq!(script.render(&inputs).unwrap(), "안내 홍길동, 홍길동, 끝");
    }

    #[test]
    fn test_numbered_script_drops_printed_suffix() {
        let script = Script::Numbered {
            part1: "승객께서는".into(),
            part2: "번 탑승구로 오세요.".into(),
        };
        let inputs = ScriptInputs {
            name: "23".into(),
            ..Default::default()
        };
        assert_eq!(script.render(&inputs).unwrap(), "승객께서는 23번 탑승구로 오세요.");
    }

    #[test]
    fn test_name_and_gate_script() {
        let script = Script::NameAndGate {
            part1: "A".into(),
            part2: "B".into(),
            part3: "번 C".into(),
        };
        let inputs = ScriptInputs {
            name: "Kim".into(),
            gate: "7".into(),
            repeat: 1,
            gate_repeat: 2,
            ..Default::default()
        };
        assert_eq!(script.render(&inputs).unwrap(), "A Kim, B 7번, 7번 C");

        let missing = ScriptInputs {
            name: "Kim".into(),
            ..Default::default()
        };
        assert_eq!(script.render(&missing), Err(ScriptError::MissingNameAndGate));
    }

    #[test]
    fn test_floor_gate_script_fills_gate() {
        let script = Script::FloorGate {
            part1: "탑승구가".into(),
            part2: "Now gate {gate}.".into(),
        };
        let inputs = ScriptInputs {
            floor: "3".into(),
            gate: "12".into(),
            ..Default::default()
        };
        assert_eq!(
            script.render(&inputs).unwrap(),
            "탑승구가 3층 12번으로 변경되었습니다. Now gate 12."
        );
    }

    #[test]
    fn test_time_script_requires_both_fields() {
        let script = Script::Time {
            part1: "출발 시각은".into(),
            part2: "감사합니다.".into(),
        };
        let inputs = ScriptInputs {
            hour: "7".into(),
            minute: "30".into(),
            ..Default::default()
        };
        assert_eq!(
            script.render(&inputs).unwrap(),
            "출발 시각은 7시 30분 경 입니다. 감사합니다."
        );

        let blank_minute = ScriptInputs {
            hour: "7".into(),
            minute: "  ".into(),
            ..Default::default()
        };
        assert_eq!(script.render(&blank_minute), Err(ScriptError::MissingTime));
    }

    #[test]
    fn test_compose_fills_placeholders() {
        let selection = FlightSelection {
            flight: "KE1".into(),
            destination: "ICN".into(),
        };
        let text = compose(
            &Source::Broadcast {
                id: "boarding".into(),
                inputs: ScriptInputs::default(),
            },
            &default_broadcasts(),
            &selection,
            &airports(),
        )
        .unwrap();
        assert!(text.starts_with("인천행 케이이, 일편을"));
        assert!(!text.contains('{'));
    }

    #[test]
    fn test_compose_rejects_blank_custom_text() {
        let err = compose(
            &Source::Custom("  ".into()),
            &[],
            &FlightSelection::default(),
            &airports(),
        )
        .unwrap_err();
        assert_eq!(err, ScriptError::EmptyCustomText);
    }

    #[test]
    fn test_compose_unknown_broadcast() {
        let err = compose(
            &Source::Broadcast {
                id: "nope".into(),
                inputs: ScriptInputs::default(),
            },
            &default_broadcasts(),
            &FlightSelection::default(),
            &airports(),
        )
        .unwrap_err();
        assert_eq!(err, ScriptError::UnknownBroadcast("nope".into()));
    }
}
