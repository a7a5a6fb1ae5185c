use modkit_repo_macros::Record;

#[derive(Record)]
#[record(created_at_col = created_at)]
pub struct Model {
    pub id: i64,
}

fn main() {}
