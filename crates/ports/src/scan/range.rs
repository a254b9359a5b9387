#![forbid(unsafe_code)]

use crate::error::Error;
use std::collections::BTreeSet;
use std::str::FromStr;

/// An ordered, duplicate-free list of ports parsed from an expression such
/// as `3000-3010,8080,9000-9005`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortList(Vec<u16>);

impl PortList {
    pub fn into_vec(self) -> Vec<u16> {
        self.0
    }
}

impl FromStr for PortList {
    type Err = Error;

    fn from_str(expr: &str) -> Result<Self, Self::Err> {
        parse_port_range(expr).map(Self)
    }
}

pub fn parse_port_range(expr: &str) -> Result<Vec<u16>, Error> {
    let mut ports = Vec::new();
    let mut seen = BTreeSet::new();

    for part in expr.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let (start, end) = match part.split_once('-') {
            Some((start, end)) => {
                let start = parse_port(start, "start port")?;
                let end = parse_port(end, "end port")?;
                if start > end {
                    return Err(Error::InvalidPortRange(format!(
                        "start port ({start}) must be <= end port ({end})"
                    )));
                }
                (start, end)
            }
            None => {
                let port = parse_port(part, "port")?;
                (port, port)
            }
        };
        for port in start..=end {
            if seen.insert(port) {
                ports.push(port);
            }
        }
    }

    if ports.is_empty() {
        return Err(Error::InvalidPortRange("no valid ports specified".into()));
    }
    Ok(ports)
}

fn parse_port(text: &str, what: &str) -> Result<u16, Error> {
    let text = text.trim();
    let value: u32 = text
        .parse()
        .map_err(|_| Error::InvalidPortRange(format!("invalid {what}: {text}")))?;
    match u16::try_from(value) {
        Ok(port) if port > 0 => Ok(port),
        _ => Err(Error::InvalidPort(value)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn mixed_expression_keeps_order_and_drops_repeats() {
        let ports = parse_port_range("3000-3002, 8080,3001,9000-9001").unwrap();
        assert_eq!(ports, vec![3000, 3001, 3002, 8080, 9000, 9001]);
    }

    #[test]
    fn rejects_bad_expressions() {
        assert!(matches!(
            parse_port_range("3010-3000"),
            Err(Error::InvalidPortRange(_))
        ));
        assert!(matches!(parse_port_range("0"), Err(Error::InvalidPort(0))));
        assert!(matches!(
            parse_port_range("70000"),
            Err(Error::InvalidPort(70000))
        ));
        assert!(matches!(
            parse_port_range("80-90-100"),
            Err(Error::InvalidPortRange(_))
        ));
        assert!(matches!(
            parse_port_range(" , "),
            Err(Error::InvalidPortRange(_))
        ));
        assert!(matches!(
            parse_port_range("http"),
            Err(Error::InvalidPortRange(_))
        ));
    }

    proptest! {
        #[test]
        fn ranges_expand_to_every_member(start in 1u16..60000, len in 0u16..200) {
            let end = start.saturating_add(len);
            let list: PortList = format!("{start}-{end}").parse().unwrap();
            let expected: Vec<u16> = (start..=end).collect();
            prop_assert_eq!(list.into_vec(), expected);
        }

        #[test]
        fn parsed_lists_never_repeat(ports in prop::collection::vec(1u16..=u16::MAX, 1..30)) {
            let expr = ports.iter().map(u16::to_string).collect::<Vec<_>>().join(",");
            let parsed = parse_port_range(&expr).unwrap();
            let unique: BTreeSet<_> = parsed.iter().collect();
            prop_assert_eq!(unique.len(), parsed.len());
            prop_assert_eq!(parsed[0], ports[0]);
        }
    }
}
