use super::ScanActionDescriptor;

pub fn gitleaks() -> ScanActionDescriptor {
    ScanActionDescriptor::new(
        "GitLeaks",
        "Runs GitLeaks to look for potential secrets in the commit. From https://github.com/zricethezav/gitleaks.",
    )
    .install([
        "VERSION=$(curl https://api.github.com/repositories/119190187/releases/latest | jq .tag_name -r | sed 's/v//')",
        "FILENAME=gitleaks_${VERSION}_linux_x64.tar.gz",
        "wget https://github.com/zricethezav/gitleaks/releases/download/v$VERSION/$FILENAME",
        "tar -zxvf $FILENAME gitleaks",
        "chmod +x gitleaks",
    ])
    // --no-git: the source artifact carries no .git folder
    .build(["./gitleaks detect --source . --no-git --redact -v -r GitLeaks.log"])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gitleaks_fails_on_secrets() {
        let action = gitleaks();
        assert!(action.fails_on_findings);
        assert!(!action.build[0].contains("--exit-code 0"));
    }
}
