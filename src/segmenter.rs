//! Bilingual text segmentation.
//!
//! Splits mixed Korean/English text into language-tagged runs so each run
//! can be spoken with a voice for its language. Classification is by script
//! range only: ASCII letters are English, Hangul syllables are Korean, and
//! everything else (digits, spaces, punctuation) attaches to whichever run
//! is open.

use serde::Serialize;

/// Pronunciation language of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Lang {
    Korean,
    English,
    Unspecified,
}

impl std::fmt::Display for Lang {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Korean => write!(f, "Korean"),
            Self::English => write!(f, "English"),
            Self::Unspecified => write!(f, "unspecified"),
        }
    }
}

/// A maximal substring spoken in one language.
///
/// `start` is a character offset into the source text, not a byte offset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Run {
    pub text: String,
    pub lang: Lang,
    pub start: usize,
}

impl Run {
    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }
}

/// Script class of a single character. `None` is neutral.
fn classify(ch: char) -> Option<Lang> {
    if ch.is_ascii_alphabetic() {
        Some(Lang::English)
    } else if ('가'..='힣').contains(&ch) {
        Some(Lang::Korean)
    } else {
        None
    }
}

/// True when the trimmed text is one or more ASCII digits.
fn is_digit_run(text: &str) -> bool {
    let trimmed = text.trim();
    !trimmed.is_empty() && trimmed.chars().all(|c| c.is_ascii_digit())
}

/// Run being accumulated.
struct OpenRun {
    text: String,
    lang: Option<Lang>,
    start: usize,
}

impl OpenRun {
    fn new(ch: char, lang: Option<Lang>, start: usize) -> Self {
        Self {
            text: ch.to_string(),
            lang,
            start,
        }
    }

    fn close(self) -> Run {
        // Bare numbers are read as Korean numerals unless something else claimed them
        let lang = match self.lang {
            Some(lang) => lang,
            None if is_digit_run(&self.text) => Lang::Korean,
            None => Lang::Unspecified,
        };
        Run {
            text: self.text,
            lang,
            start: self.start,
        }
    }
}

/// Split text into ordered language runs.
///
/// Empty or whitespace-only input yields no runs. Concatenating the texts of
/// the returned runs always reproduces `text` exactly.
pub fn segment(text: &str) -> Vec<Run> {
    let mut runs = Vec::new();
    if text.trim().is_empty() {
        return runs;
    }

    let mut open: Option<OpenRun> = None;

    for (i, ch) in text.chars().enumerate() {
        let class = classify(ch);

        let Some(run) = open.as_mut() else {
            open = Some(OpenRun::new(ch, class, i));
            continue;
        };

        match (run.lang, class) {
            (_, None) => run.text.push(ch),
            (Some(current), Some(next)) if current == next => run.text.push(ch),
            (None, Some(Lang::Korean)) => {
                run.text.push(ch);
                run.lang = Some(Lang::Korean);
            }
            // Leading spaces/punctuation take the first language they meet;
            // a bare number followed by English closes and defaults to Korean.
            (None, Some(next)) if !is_digit_run(&run.text) => {
                run.text.push(ch);
                run.lang = Some(next);
            }
            _ => {
                if let Some(done) = open.take() {
                    runs.push(done.close());
                }
                open = Some(OpenRun::new(ch, class, i));
            }
        }
    }

    if let Some(done) = open {
        runs.push(done.close());
    }

    runs
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(runs: &[Run]) -> Vec<(&str, Lang)> {
        runs.iter().map(|r| (r.text.as_str(), r.lang)).collect()
    }

    const SAMPLES: &[&str] = &[
        "",
        "   ",
        "12가나",
        "ABC가나123",
        "123ABC",
        "  Hello",
        "...!!",
        "Flight KE123 to 인천, 탑승구 23번입니다. Thank you.",
        "대한항공 KE 1 2 3편 승객 여러분께 안내 말씀 드립니다.",
        "가 A 나 B 1 2 3",
        "7시 30분 경 입니다.",
    ];

    #[test]
    fn test_empty_and_whitespace_yield_no_runs() {
        assert!(segment("").is_empty());
        assert!(segment(" \t\n ").is_empty());
    }

    #[test]
    fn test_digits_before_korean_join_korean_run() {
        let runs = segment("12가나");
        assert_eq!(
            runs,
            vec![Run {
                text: "12가나".into(),
                lang: Lang::Korean,
                start: 0
            }]
        );
    }

    #[test]
    fn test_mixed_english_korean_digits() {
        let runs = segment("ABC가나123");
        assert_eq!(texts(&runs), vec![("ABC", Lang::English), ("가나123", Lang::Korean)]);
        assert_eq!(runs[0].start, 0);
        assert_eq!(runs[1].start, 3);
    }

    #[test]
    fn test_digits_before_english_default_to_korean() {
        let runs = segment("123ABC");
        assert_eq!(texts(&runs), vec![("123", Lang::Korean), ("ABC", Lang::English)]);
        assert_eq!(runs[1].start, 3);
    }

    #[test]
    fn test_leading_punctuation_adopts_first_language() {
        let runs = segment("  Hello");
        assert_eq!(texts(&runs), vec![("  Hello", Lang::English)]);
    }

    #[test]
    fn test_all_neutral_is_single_unspecified_run() {
        let runs = segment("...!!");
        assert_eq!(texts(&runs), vec![("...!!", Lang::Unspecified)]);
    }

    #[test]
    fn test_pure_number_run_defaults_to_korean() {
        let runs = segment(" 42 ");
        assert_eq!(texts(&runs), vec![(" 42 ", Lang::Korean)]);
    }

    #[test]
    fn test_offsets_are_character_offsets() {
        let runs = segment("Flight KE123 to 인천");
        assert_eq!(
            texts(&runs),
            vec![("Flight KE123 to ", Lang::English), ("인천", Lang::Korean)]
        );
        assert_eq!(runs[1].start, 16);
    }

    #[test]
    fn test_runs_reconstruct_input() {
        for sample in SAMPLES {
            let runs = segment(sample);
            let joined: String = runs.iter().map(|r| r.text.as_str()).collect();
            if sample.trim().is_empty() {
                assert!(runs.is_empty());
            } else {
                assert_eq!(&joined, sample);
            }

            // Offsets are contiguous
            let mut expected = 0;
            for run in &runs {
                assert!(!run.text.is_empty());
                assert_eq!(run.start, expected, "bad offset in {sample:?}");
                expected += run.char_len();
            }
        }
    }

    #[test]
    fn test_adjacent_runs_differ_in_language() {
        for sample in SAMPLES {
            let runs = segment(sample);
            for pair in runs.windows(2) {
                let boundary = pair[1].text.chars().next();
                assert!(boundary.and_then(classify).is_some(), "{sample:?}");
                if pair[0].lang == pair[1].lang {
                    // Only a closed bare-number run may precede a same-language run
                    assert!(is_digit_run(&pair[0].text), "{sample:?}");
                }
            }
        }
    }

    #[test]
    fn test_resegmenting_is_stable() {
        for sample in SAMPLES {
            let first = segment(sample);
            let joined: String = first.iter().map(|r| r.text.as_str()).collect();
            assert_eq!(segment(&joined), first);
        }
    }

    #[test]
    fn test_alternating_scripts() {
        let runs = segment("가 A 나");
        assert_eq!(
            texts(&runs),
            vec![("가 ", Lang::Korean), ("A ", Lang::English), ("나", Lang::Korean)]
        );
    }
}
