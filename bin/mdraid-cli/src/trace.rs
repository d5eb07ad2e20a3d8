//! Workload trace replay
//!
//! A trace is a text file with one operation per line:
//!
//! ```text
//! MOUNT
//! WRITE_PERMISSION
//! WRITE 1000 300 171
//! READ 1000 300
//! REVOKE_WRITE_PERMISSION
//! UNMOUNT
//! ```
//!
//! `WRITE addr len byte` fills `len` bytes with `byte`. Blank lines and
//! lines starting with `#` are skipped.

use std::collections::HashMap;
use std::str::FromStr;

use anyhow::{Context, Result, anyhow, bail, ensure};
use mdraid_block::Mdadm;
use mdraid_proto::BlockArray;
use tracing::{debug, warn};

/// One trace operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraceOp {
    Mount,
    Unmount,
    GrantWrite,
    RevokeWrite,
    Read { addr: u32, len: u32 },
    Write { addr: u32, len: u32, byte: u8 },
}

impl FromStr for TraceOp {
    type Err = anyhow::Error;

    fn from_str(line: &str) -> Result<Self> {
        let mut fields = line.split_whitespace();
        let name = fields.next().ok_or_else(|| anyhow!("empty line"))?;
        let mut number = |what: &str| -> Result<u32> {
            let field = fields.next().ok_or_else(|| anyhow!("{name}: missing {what}"))?;
            field
                .parse()
                .with_context(|| format!("{name}: bad {what} {field:?}"))
        };

        let op = match name {
            "MOUNT" => Self::Mount,
            "UNMOUNT" => Self::Unmount,
            "WRITE_PERMISSION" => Self::GrantWrite,
            "REVOKE_WRITE_PERMISSION" => Self::RevokeWrite,
            "READ" => Self::Read {
                addr: number("address")?,
                len: number("length")?,
            },
            "WRITE" => {
                let addr = number("address")?;
                let len = number("length")?;
                let byte = u8::try_from(number("byte")?).context("WRITE: byte above 255")?;
                Self::Write { addr, len, byte }
            }
            other => bail!("unknown operation {other:?}"),
        };
        ensure!(fields.next().is_none(), "{name}: trailing fields");
        Ok(op)
    }
}

/// Parse a whole trace, keeping 1-based line numbers
pub fn parse(text: &str) -> Result<Vec<(usize, TraceOp)>> {
    text.lines()
        .enumerate()
        .map(|(index, line)| (index + 1, line.trim()))
        .filter(|(_, line)| !line.is_empty() && !line.starts_with('#'))
        .map(|(number, line)| {
            line.parse::<TraceOp>()
                .map(|op| (number, op))
                .with_context(|| format!("line {number}"))
        })
        .collect()
}

/// Outcome of a replay
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TraceSummary {
    pub operations: usize,
    pub bytes_read: u64,
    pub bytes_written: u64,
    /// Reads that disagreed with earlier writes in the same trace
    pub mismatches: usize,
}

/// Replays traces against a device, optionally checking reads
pub struct Replayer {
    /// Bytes written so far, by address
    shadow: Option<HashMap<u32, u8>>,
}

impl Replayer {
    pub fn new(verify: bool) -> Self {
        Self {
            shadow: verify.then(HashMap::new),
        }
    }

    /// Run every operation in order, stopping at the first error
    pub fn run<A: BlockArray>(
        &mut self,
        mdadm: &mut Mdadm<A>,
        ops: &[(usize, TraceOp)],
    ) -> Result<TraceSummary> {
        let mut summary = TraceSummary::default();
        let mut buf = Vec::new();

        for &(line, op) in ops {
            debug!(line, ?op, "replay");
            let result = match op {
                TraceOp::Mount => mdadm.mount(),
                TraceOp::Unmount => mdadm.unmount(),
                TraceOp::GrantWrite => mdadm.grant_write(),
                TraceOp::RevokeWrite => mdadm.revoke_write(),
                TraceOp::Read { addr, len } => {
                    buf.resize(len as usize, 0);
                    mdadm.read(addr, len, &mut buf).map(|n| {
                        summary.bytes_read += u64::from(n);
                        if !self.matches(addr, &buf) {
                            warn!(line, addr, len, "read does not match trace writes");
                            summary.mismatches += 1;
                        }
                    })
                }
                TraceOp::Write { addr, len, byte } => {
                    buf.clear();
                    buf.resize(len as usize, byte);
                    mdadm.write(addr, len, &buf).map(|n| {
                        summary.bytes_written += u64::from(n);
                        self.record(addr, &buf);
                    })
                }
            };
            result.with_context(|| format!("line {line}: {op:?}"))?;
            summary.operations += 1;
        }

        Ok(summary)
    }

    fn record(&mut self, addr: u32, data: &[u8]) {
        if let Some(shadow) = &mut self.shadow {
            for (addr, &byte) in (addr..).zip(data) {
                shadow.insert(addr, byte);
            }
        }
    }

    fn matches(&self, addr: u32, data: &[u8]) -> bool {
        self.shadow.as_ref().is_none_or(|shadow| {
            (addr..)
                .zip(data)
                .all(|(addr, byte)| shadow.get(&addr).is_none_or(|expected| expected == byte))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mdraid_common::Geometry;
    use mdraid_storage::Jbod;

    const WORKLOAD: &str = "\
# disk-crossing workload
MOUNT
WRITE_PERMISSION
WRITE 65486 300 171

READ 65486 300
READ 65000 1024
REVOKE_WRITE_PERMISSION
UNMOUNT
";

    #[test]
    fn test_parse_lines() {
        assert_eq!("MOUNT".parse::<TraceOp>().unwrap(), TraceOp::Mount);
        assert_eq!(
            "  WRITE 10 20 255 ".trim().parse::<TraceOp>().unwrap(),
            TraceOp::Write {
                addr: 10,
                len: 20,
                byte: 255
            }
        );
        assert!("WRITE 10 20 256".parse::<TraceOp>().is_err());
        assert!("READ 10".parse::<TraceOp>().is_err());
        assert!("READ 10 20 30".parse::<TraceOp>().is_err());
        assert!("SEEK 1".parse::<TraceOp>().is_err());
    }

    #[test]
    fn test_parse_keeps_line_numbers() {
        let ops = parse(WORKLOAD).unwrap();
        assert_eq!(ops.len(), 7);
        assert_eq!(ops[0], (2, TraceOp::Mount));
        assert_eq!(ops[3].0, 6);

        let err = parse("MOUNT\nBOGUS\n").unwrap_err();
        assert!(format!("{err:#}").contains("line 2"));
    }

    #[test]
    fn test_replay_verifies_reads() {
        let geometry = Geometry::new(8, 256).unwrap();
        let mut mdadm = Mdadm::new(Jbod::new(geometry), geometry);
        mdadm.cache_mut().create(16).unwrap();

        let summary = Replayer::new(true)
            .run(&mut mdadm, &parse(WORKLOAD).unwrap())
            .unwrap();
        assert_eq!(summary.operations, 7);
        assert_eq!(summary.bytes_written, 300);
        assert_eq!(summary.bytes_read, 1324);
        assert_eq!(summary.mismatches, 0);
        assert!(mdadm.cache().stats().hits > 0);
    }

    #[test]
    fn test_replay_stops_at_error() {
        let geometry = Geometry::new(2, 4).unwrap();
        let mut mdadm = Mdadm::new(Jbod::new(geometry), geometry);
        let ops = parse("MOUNT\nWRITE 0 4 1\nUNMOUNT\n").unwrap();

        let err = Replayer::new(false).run(&mut mdadm, &ops).unwrap_err();
        assert!(format!("{err:#}").contains("line 2"));
        assert!(mdadm.is_mounted());
    }
}
