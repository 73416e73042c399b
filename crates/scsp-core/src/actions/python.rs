use super::ScanActionDescriptor;

pub fn bandit() -> ScanActionDescriptor {
    ScanActionDescriptor::new(
        "Bandit",
        "Runs the Bandit Python security tool on all Python files in the repository",
    )
    .install(["pip install bandit"])
    .build(["python -m bandit -v -r . -o Bandit.log"])
    .pre_report([
        "cat Bandit.log",
        "echo \"If there are any security issues, fix them and commit your new code. If there is a false positive, you can suppress it by adding a comment beginning with '# nosec - ' and ending with the reason why it is a false positive\"",
    ])
}

pub fn flake8() -> ScanActionDescriptor {
    ScanActionDescriptor::new(
        "Flake8",
        "Runs the Flake8 Python syntax checker on all Python files in the repository",
    )
    .install(["pip install flake8"])
    .build(["python -m flake8 . --output-file Flake8.log --max-line-length=120"])
    .pre_report([
        "cat Flake8.log",
        "echo \"To automatically fix formatting-related issues, consider installing black with *pip install black* and running it locally using *black <filename>*\"",
    ])
}
