use vergen_gitcl::{Build, Emitter, Gitcl};

// Emits VERGEN_BUILD_TIMESTAMP and VERGEN_GIT_{BRANCH,SHA,DIRTY} for src/version.rs.
// Outside a git checkout vergen emits placeholders, which version.rs treats as missing.
fn main() -> Result<(), Box<dyn std::error::Error>> {
    let build = Build::builder().build_timestamp(true).build();
    let gitcl = Gitcl::builder().branch(true).sha(true).dirty(true).build();

    Emitter::default()
        .add_instructions(&build)?
        .add_instructions(&gitcl)?
        .emit()?;

    Ok(())
}
