#![forbid(unsafe_code)]

//! Parsers for the listener tables printed by `lsof`, `ss` and `netstat`.

use super::Listener;

/// `lsof -i :PORT -sTCP:LISTEN -P -n`
///
/// ```text
/// COMMAND   PID USER   FD   TYPE DEVICE SIZE/OFF NODE NAME
/// node    12345 dev    23u  IPv6 123456      0t0  TCP *:3000 (LISTEN)
/// ```
pub fn parse_lsof(output: &str) -> Vec<Listener> {
    output
        .lines()
        .skip(1)
        .filter_map(|line| {
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.len() < 9 {
                return None;
            }
            let pid = fields[1].parse().ok()?;
            Some(Listener::new(pid, Some(fields[0])))
        })
        .collect()
}

/// `ss -tlnp "sport = :PORT"`
///
/// ```text
/// State  Recv-Q Send-Q Local Address:Port Peer Address:Port Process
/// LISTEN 0      511    *:3000             *:*               users:(("node",pid=12345,fd=20))
/// ```
pub fn parse_ss(output: &str) -> Vec<Listener> {
    output
        .lines()
        .filter_map(|line| line.split_once("users:("))
        .flat_map(|(_, users)| parse_ss_users(users))
        .collect()
}

fn parse_ss_users(users: &str) -> Vec<Listener> {
    users
        .split("),(")
        .filter_map(|entry| {
            let entry = entry.trim_start_matches('(').trim_end_matches(')');
            let mut fields = entry.split(',');
            let name = fields.next()?.trim_matches('"');
            let pid = fields.find_map(|field| field.strip_prefix("pid="))?;
            let pid = pid.parse().ok()?;
            Some(Listener::new(pid, Some(name)))
        })
        .collect()
}

/// `netstat -tlnp` lists every listener, so rows are filtered by the local
/// address ending in `:PORT`.
///
/// ```text
/// Proto Recv-Q Send-Q Local Address  Foreign Address State  PID/Program name
/// tcp        0      0 0.0.0.0:3000   0.0.0.0:*       LISTEN 12345/node
/// ```
pub fn parse_netstat(output: &str, port: u16) -> Vec<Listener> {
    let suffix = format!(":{port}");
    output
        .lines()
        .filter_map(|line| {
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.len() < 7 || !fields.contains(&"LISTEN") {
                return None;
            }
            if !fields[3].ends_with(&suffix) {
                return None;
            }
            let (pid, name) = fields[fields.len() - 1].split_once('/')?;
            let pid = pid.parse().ok()?;
            Some(Listener::new(pid, Some(name)))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn lsof_rows_after_header() {
        let output = "\
COMMAND   PID USER   FD   TYPE DEVICE SIZE/OFF NODE NAME
node    12345 dev    23u  IPv4 123456      0t0  TCP *:3000 (LISTEN)
node    12345 dev    24u  IPv6 123457      0t0  TCP *:3000 (LISTEN)
";
        assert_eq!(
            parse_lsof(output),
            vec![
                Listener::new(12345, Some("node")),
                Listener::new(12345, Some("node")),
            ]
        );
        assert!(parse_lsof("").is_empty());
        assert!(parse_lsof("COMMAND PID USER\n").is_empty());
    }

    #[test]
    fn ss_users_section_may_hold_several_processes() {
        let output = "\
State  Recv-Q Send-Q Local Address:Port Peer Address:Port Process
LISTEN 0      511    0.0.0.0:8080       0.0.0.0:*         users:((\"nginx\",pid=901,fd=6),(\"nginx\",pid=902,fd=6))
LISTEN 0      511    [::]:8080          [::]:*
";
        assert_eq!(
            parse_ss(output),
            vec![
                Listener::new(901, Some("nginx")),
                Listener::new(902, Some("nginx")),
            ]
        );
    }

    #[test]
    fn netstat_matches_exact_port_only() {
        let output = "\
Active Internet connections (only servers)
Proto Recv-Q Send-Q Local Address           Foreign Address         State       PID/Program name
tcp        0      0 0.0.0.0:3000            0.0.0.0:*               LISTEN      4242/node
tcp        0      0 0.0.0.0:30001           0.0.0.0:*               LISTEN      4343/other
tcp6       0      0 :::3000                 :::*                    LISTEN      -
";
        assert_eq!(
            parse_netstat(output, 3000),
            vec![Listener::new(4242, Some("node"))]
        );
        assert!(parse_netstat(output, 8080).is_empty());
    }
}
