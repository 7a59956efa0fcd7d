use crate::auth::Login;
use crate::graphql::{Auth, GraphQlClient, Operation};
use crate::queries::{line_item_rows_variables, LINE_ITEM_ROWS};
use stampede::prelude::*;

#[derive(Copy, Clone, Debug)]
pub enum LineItemsTask {
    LineItemRows,
}

/// Pages through the line items list view.
pub struct LineItemsUser {
    graphql: GraphQlClient,
    login: Login,
    token: String,
}

impl LineItemsUser {
    pub fn new(graphql: GraphQlClient, login: Login) -> Self {
        Self {
            graphql,
            login,
            token: String::new(),
        }
    }
}

impl User for LineItemsUser {
    type Task = LineItemsTask;

    fn tasks(&self) -> Result<TaskSet<LineItemsTask>, TaskSetError> {
        TaskSet::weighted([(LineItemsTask::LineItemRows, 1)])
    }

    fn wait_time(&self) -> WaitTime {
        WaitTime::between_secs(2., 5.)
    }

    async fn on_start(&mut self, _ctx: &UserContext) -> Result<(), UserError> {
        self.token = self.login.token().await.map_err(UserError::start)?;
        Ok(())
    }

    async fn execute(&mut self, task: LineItemsTask, ctx: &UserContext) {
        match task {
            LineItemsTask::LineItemRows => {
                let op = Operation::new("LineItemRows", LINE_ITEM_ROWS)
                    .variables(line_item_rows_variables());
                self.graphql.execute(ctx, &op, Auth::Cookie(&self.token)).await;
            }
        }
    }
}
