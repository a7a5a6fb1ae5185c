use modkit_repo_macros::Record;

#[derive(Record)]
pub enum Model {
    A,
}

fn main() {}
