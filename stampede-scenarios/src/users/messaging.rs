use crate::auth::Login;
use crate::graphql::{Auth, GraphQlClient, Operation};
use crate::queries::{add_message_variables, ADD_MESSAGE_TO_CONVERSATIONS};
use rand::rngs::SmallRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use stampede::prelude::*;

/// Conversations the messaging load lands on.
pub const CONVERSATION_IDS: [u64; 5] = [419246, 419248, 419250, 419252, 419254];

#[derive(Copy, Clone, Debug)]
pub enum MessagingTask {
    AddMessage,
}

/// Posts messages into a fixed pool of conversations.
pub struct MessagingUser {
    graphql: GraphQlClient,
    login: Login,
    token: String,
    rng: SmallRng,
}

impl MessagingUser {
    pub fn new(graphql: GraphQlClient, login: Login) -> Self {
        Self {
            graphql,
            login,
            token: String::new(),
            rng: SmallRng::from_entropy(),
        }
    }
}

/// `Load test message <1..=1000>`
pub fn message_body<R: Rng + ?Sized>(rng: &mut R) -> String {
    format!("Load test message {}", rng.gen_range(1..=1000))
}

impl User for MessagingUser {
    type Task = MessagingTask;

    fn tasks(&self) -> Result<TaskSet<MessagingTask>, TaskSetError> {
        TaskSet::weighted([(MessagingTask::AddMessage, 1)])
    }

    fn wait_time(&self) -> WaitTime {
        WaitTime::between_secs(2., 5.)
    }

    async fn on_start(&mut self, _ctx: &UserContext) -> Result<(), UserError> {
        self.token = self.login.token().await.map_err(UserError::start)?;
        Ok(())
    }

    async fn execute(&mut self, task: MessagingTask, ctx: &UserContext) {
        match task {
            MessagingTask::AddMessage => {
                let conversation_id = CONVERSATION_IDS
                    .choose(&mut self.rng)
                    .copied()
                    .unwrap_or(CONVERSATION_IDS[0]);
                let body = message_body(&mut self.rng);
                let op = Operation::new("AddMessageToConversations", ADD_MESSAGE_TO_CONVERSATIONS)
                    .variables(add_message_variables(conversation_id, &body, false));
                self.graphql.execute(ctx, &op, Auth::Cookie(&self.token)).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_bodies_stay_in_range() {
        let mut rng = SmallRng::seed_from_u64(7);
        for _ in 0..200 {
            let body = message_body(&mut rng);
            let n: u32 = body.trim_start_matches("Load test message ").parse().unwrap();
            assert!((1..=1000).contains(&n));
        }
    }
}
