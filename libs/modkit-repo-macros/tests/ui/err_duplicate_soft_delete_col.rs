use modkit_repo_macros::Record;

#[derive(Record)]
#[record(soft_delete_col = "deleted_at", soft_delete_col = "removed_at")]
pub struct Model {
    pub id: i64,
}

fn main() {}
