/// A patient name split into the two components the reaper cares about.
///
/// Either component may be absent; a name with neither is never constructed
/// by [`PatientName::parse`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatientName {
    pub first: Option<String>,
    pub last: Option<String>,
}

impl PatientName {
    /// Parses a person-name value.
    ///
    /// The structured form is `Last^First^Middle^Prefix^Suffix`; only the
    /// first two groups are kept. Free-text names without a `^` are read as
    /// `First [Middle…] Last`, where the final word is the last name.
    /// A `/` separates nothing, so `Jane/Doe` is a single word and yields a
    /// last name only.
    /// Components are whitespace-normalized and title-cased so the same
    /// person hashes identically however the operator typed them.
    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim();
        if value.is_empty() {
            return None;
        }
        let (first, last) = match value.split_once('^') {
            Some((last, rest)) => (rest.split('^').next().unwrap_or_default(), last),
            None => match value.rsplit_once(char::is_whitespace) {
                Some((first, last)) => (first, last),
                None => ("", value),
            },
        };
        let name = Self {
            first: normalize(first),
            last: normalize(last),
        };
        (name.first.is_some() || name.last.is_some()).then_some(name)
    }
}

fn normalize(component: &str) -> Option<String> {
    let words: Vec<String> = component.split_whitespace().map(title_case).collect();
    (!words.is_empty()).then(|| words.join(" "))
}

fn title_case(word: &str) -> String {
    let mut out = String::with_capacity(word.len());
    let mut boundary = true;
    for c in word.chars() {
        if boundary {
            out.extend(c.to_uppercase());
        } else {
            out.extend(c.to_lowercase());
        }
        boundary = !c.is_alphabetic();
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn name(first: Option<&str>, last: Option<&str>) -> PatientName {
        PatientName {
            first: first.map(str::to_string),
            last: last.map(str::to_string),
        }
    }

    #[rstest]
    #[case("DOE^JANE", name(Some("Jane"), Some("Doe")))]
    #[case("Doe^Jane^Q^^", name(Some("Jane"), Some("Doe")))]
    #[case("Doe^", name(None, Some("Doe")))]
    #[case("^Jane", name(Some("Jane"), None))]
    #[case("jane doe", name(Some("Jane"), Some("Doe")))]
    #[case("Mary  Ann O'BRIEN", name(Some("Mary Ann"), Some("O'Brien")))]
    #[case("Jane/Doe", name(None, Some("Jane/Doe")))]
    fn test_parse(#[case] value: &str, #[case] expected: PatientName) {
        assert_eq!(PatientName::parse(value), Some(expected));
    }

    #[rstest]
    #[case("")]
    #[case("   ")]
    #[case("^")]
    #[case("^^^")]
    fn test_parse_empty(#[case] value: &str) {
        assert_eq!(PatientName::parse(value), None);
    }
}
