//! Violation certificates.
//!
//! The certificate is a plain text document written to
//! `<dir>/<violation id>.txt`. It carries a sha256 digest of the CBOR encoded
//! violation so a printed copy can be checked against the stored document.
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;

use super::rules::Rule;
use super::truck::Truck;
use super::violation::Violation;

pub trait DocumentGenerator: Send + Sync + 'static {
    /// `truck.score` is the ordinal printed on the certificate.
    fn generate(&self, violation: &Violation, truck: &Truck, rule: &Rule) -> anyhow::Result<PathBuf>;
}

#[derive(Debug, Clone)]
pub struct CertificateWriter {
    dir: PathBuf,
}

impl CertificateWriter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, violation_id: &str) -> PathBuf {
        certificate_path(&self.dir, violation_id)
    }
}

pub fn certificate_path(dir: &Path, violation_id: &str) -> PathBuf {
    dir.join(format!("{violation_id}.txt"))
}

/// Hex sha256 of the stored form of `violation`.
pub fn verification_digest(violation: &Violation) -> anyhow::Result<String> {
    let cbor = minicbor::to_vec(violation).context("failed to encode violation")?;
    Ok(sha256::digest(&cbor))
}

pub fn render(violation: &Violation, truck: &Truck, rule: &Rule) -> anyhow::Result<String> {
    let mut out = String::new();
    writeln!(out, "VIOLATION CERTIFICATE")?;
    writeln!(out, "branch:       {}", violation.branch)?;
    writeln!(out, "document:     {}", violation.id)?;
    writeln!(out)?;
    writeln!(out, "truck:        {}", violation.truck_identity)?;
    writeln!(out, "plate:        {}", violation.plate)?;
    writeln!(out, "mark:         {}", violation.mark)?;
    writeln!(out, "owner:        {}", violation.owner)?;
    writeln!(out)?;
    writeln!(out, "type:         {}", violation.kind)?;
    writeln!(out, "detail:       {}", violation.detail)?;
    writeln!(out, "occurred at:  {}", violation.occurred_at)?;
    writeln!(out, "location:     {}", violation.location)?;
    writeln!(out, "violation no: {}", truck.score)?;
    writeln!(out, "sanction:     {}", rule.description)?;
    if rule.blocks() {
        writeln!(out, "block time:   {} seconds", rule.block_secs)?;
    }
    if let Some(approved) = &violation.approved {
        writeln!(out)?;
        writeln!(out, "approved by:  {}", approved.by)?;
        writeln!(out, "approved at:  {}", approved.at)?;
    }
    writeln!(out)?;
    writeln!(out, "digest:       {}", verification_digest(violation)?)?;
    Ok(out)
}

impl DocumentGenerator for CertificateWriter {
    fn generate(&self, violation: &Violation, truck: &Truck, rule: &Rule) -> anyhow::Result<PathBuf> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("failed to create {}", self.dir.display()))?;
        let path = self.path_for(&violation.id);
        let body = render(violation, truck, rule)?;
        fs::write(&path, body).with_context(|| format!("failed to write {}", path.display()))?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::ViolationState;
    use crate::types::{Audit, TimeStamp};
    use crate::violation::ViolationKind;
    use tempfile::tempdir;

    fn approved_violation() -> Violation {
        let audit = Audit {
            at: TimeStamp::now(),
            by: "hsse officer".into(),
            by_id: "u-1".into(),
        };
        Violation {
            id: "viol1test".into(),
            branch: "BJM".into(),
            state: ViolationState::Approved,
            truck_identity: "TR-01".into(),
            plate: "DA 1234 XY".into(),
            mark: "HINO".into(),
            owner: "PT MAJU".into(),
            kind: ViolationKind::Behavior,
            detail: "speeding inside the terminal".into(),
            occurred_at: audit.at,
            location: "GATE 2".into(),
            images: Vec::new(),
            created: audit.clone(),
            updated: audit.clone(),
            approved: Some(audit),
            penalty_count: 2,
        }
    }

    #[test]
    fn writes_certificate_under_violation_id() {
        let dir = tempdir().unwrap();
        let writer = CertificateWriter::new(dir.path());
        let violation = approved_violation();
        let truck = Truck::with_score_only("BJM", "TR-01", 2, violation.created.clone());

        let path = writer
            .generate(&violation, &truck, &Rule::verbal_warning("BJM", 2))
            .unwrap();

        assert_eq!(path, dir.path().join("viol1test.txt"));
        let body = fs::read_to_string(path).unwrap();
        assert!(body.contains("violation no: 2"));
        assert!(body.contains("Verbal warning given."));
        assert!(body.contains(&verification_digest(&violation).unwrap()));
    }

    #[test]
    fn digest_tracks_document_changes() {
        let a = approved_violation();
        let mut b = a.clone();
        b.detail.push('!');
        assert_ne!(verification_digest(&a).unwrap(), verification_digest(&b).unwrap());
    }
}
