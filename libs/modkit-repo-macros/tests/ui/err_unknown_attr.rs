use modkit_repo_macros::Record;

#[derive(Record)]
#[record(tenant_col = "tenant_id")]
pub struct Model {
    pub id: i64,
}

fn main() {}
