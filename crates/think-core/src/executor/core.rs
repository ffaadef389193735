//! Executor: resuelve steps contra el proveedor de plantillas y conduce el
//! flow completo a través del state machine.
//!
//! El executor no invoca ningún modelo. Ejecutar un step significa resolver su
//! plantilla (con el contexto fusionado) y emitir el contenido como
//! instrucción; el resultado del step agregado queda registrado vía
//! `CompleteStep` / `FailStep`, de modo que el historial del machine cuenta la
//! historia completa de la corrida.

use serde_json::{json, Map, Value};
use std::collections::HashSet;
use std::time::Instant;
use uuid::Uuid;

use crate::errors::FlowCoreError;
use crate::executor::foreach::{iteration_step_id, resolve_iteration_items};
use crate::executor::result::{ExecutionStatus, FlowRunSummary, IterationOutcome, StepExecution, StepFailure};
use crate::executor::stats::ExecutionStats;
use crate::executor::template::{merge_context, resolve_template_name, template_params};
use crate::gateway::TemplateProvider;
use crate::machine::{FlowEvent, FlowStateMachine};
use crate::model::{Flow, FlowStatus, StepStatus};
use crate::registry::ActiveFlowRegistry;

pub struct FlowExecutor<T: TemplateProvider> {
    flows: ActiveFlowRegistry,
    templates: T,
    machine: FlowStateMachine,
    stats: ExecutionStats,
}

impl<T: TemplateProvider> FlowExecutor<T> {
    pub fn new(templates: T) -> Self {
        Self { flows: ActiveFlowRegistry::new(),
               templates,
               machine: FlowStateMachine::default(),
               stats: ExecutionStats::new() }
    }

    /// Reemplaza el state machine (para conectar gateway o historial propio).
    pub fn with_machine(mut self, machine: FlowStateMachine) -> Self {
        self.machine = machine;
        self
    }

    /// Registra un flow validado y devuelve su id.
    pub fn register_flow(&mut self, flow: Flow) -> Result<Uuid, FlowCoreError> {
        flow.validate()?;
        Ok(self.flows.insert(flow))
    }

    pub fn flow(&self, flow_id: Uuid) -> Option<&Flow> {
        self.flows.get(flow_id)
    }

    pub fn flow_mut(&mut self, flow_id: Uuid) -> Option<&mut Flow> {
        self.flows.get_mut(flow_id)
    }

    pub fn flows(&self) -> &ActiveFlowRegistry {
        &self.flows
    }

    pub fn flows_mut(&mut self) -> &mut ActiveFlowRegistry {
        &mut self.flows
    }

    pub fn templates(&self) -> &T {
        &self.templates
    }

    pub fn machine(&self) -> &FlowStateMachine {
        &self.machine
    }

    pub fn machine_mut(&mut self) -> &mut FlowStateMachine {
        &mut self.machine
    }

    pub fn stats(&self) -> &ExecutionStats {
        &self.stats
    }

    /// Aplica un evento sobre un flow registrado. Es la vía para callers que
    /// conducen la corrida paso a paso y reportan desenlaces externos
    /// (`CompleteStep` con el resultado real, `FailStep`, pausas).
    pub fn transition(&mut self,
                      flow_id: Uuid,
                      event: FlowEvent,
                      metadata: Value)
                      -> Result<FlowStatus, FlowCoreError> {
        let Self { flows, machine, .. } = self;
        let flow = flows.get_mut(flow_id)
                        .ok_or(FlowCoreError::FlowNotFound { flow_id })?;
        machine.transition(flow, event, metadata)
    }

    /// Resuelve un step puntual y lo marca `InProgress`: valida dependencias,
    /// fusiona contexto, resuelve plantilla y expande for-each. El caller
    /// decide qué hacer con el contenido y reporta el desenlace al machine por
    /// separado (`CompleteStep` / `FailStep`); las iteraciones for-each
    /// fallidas viajan en la lista de `iterations`.
    pub fn execute_step(&mut self,
                        flow_id: Uuid,
                        step_id: &str,
                        call_context: &Map<String, Value>)
                        -> Result<StepExecution, FlowCoreError> {
        let Self { flows, templates, stats, .. } = self;
        let flow = flows.get_mut(flow_id)
                        .ok_or(FlowCoreError::FlowNotFound { flow_id })?;
        let step = flow.steps
                       .get(step_id)
                       .ok_or_else(|| FlowCoreError::StepNotFound { flow_id,
                                                                    step_id: step_id.to_string() })?;
        let missing = flow.missing_dependencies(step);
        if !missing.is_empty() {
            return Err(FlowCoreError::DependenciesNotSatisfied { step_id: step_id.to_string(),
                                                                 missing });
        }
        if let Some(step) = flow.steps.get_mut(step_id) {
            step.mark_in_progress();
        }
        match Self::run_step(flow, templates, step_id, call_context, true) {
            Ok(execution) => {
                stats.record(flow_id,
                             step_id,
                             execution.status != ExecutionStatus::Failed,
                             execution.execution_time_ms);
                Ok(execution)
            }
            Err(err) => {
                stats.record(flow_id, step_id, false, 0);
                Err(err)
            }
        }
    }

    /// Corre el flow hasta quedarse sin steps ejecutables, reportando cada
    /// desenlace al state machine (`CompleteStep` / `FailStep`).
    ///
    /// Política de fallas:
    /// - un step fallido con presupuesto se reintenta en su posición
    ///   (`RetryStep` + re-ejecución);
    /// - agotado el presupuesto, `continue_on_error=true` lo salta con
    ///   `SkipStep`; sin el flag la corrida se corta con resumen `Failed` y el
    ///   flow queda `Running` para que el caller decida (`Recover`, `SkipStep`,
    ///   `Cancel`);
    /// - un step crítico agotado escala solo a `Failed` (follow-up del
    ///   machine);
    /// - con `continue_on_error=true` las iteraciones fallidas de un for-each
    ///   parcial se acumulan en `failures` sin frenar la corrida; sin el flag
    ///   la primera iteración fallida aborta el step.
    pub fn execute_flow(&mut self,
                        flow_id: Uuid,
                        continue_on_error: bool,
                        call_context: &Map<String, Value>)
                        -> Result<FlowRunSummary, FlowCoreError> {
        let Self { flows, templates, machine, stats } = self;
        let flow = flows.get_mut(flow_id)
                        .ok_or(FlowCoreError::FlowNotFound { flow_id })?;

        if flow.status == FlowStatus::Initialized {
            machine.transition(flow, FlowEvent::Start, json!({ "trigger": "execute_flow" }))?;
        }
        if flow.status != FlowStatus::Running {
            return Err(FlowCoreError::FlowState { flow_id,
                                                  current_state: flow.status,
                                                  reason: "execute_flow requires an initialized or running flow".into() });
        }

        let mut executions: Vec<StepExecution> = Vec::new();
        let mut failures: Vec<StepFailure> = Vec::new();
        let mut attempted: HashSet<String> = HashSet::new();
        let mut aborted = false;

        while let Some(step_id) = flow.get_next_step().map(|s| s.step_id.clone()) {
            let retrying = flow.steps
                               .get(&step_id)
                               .map(|s| s.status == StepStatus::Failed)
                               .unwrap_or(false);
            if retrying {
                machine.transition(flow, FlowEvent::RetryStep, json!({ "step_id": step_id }))?;
            }
            if let Some(step) = flow.steps.get_mut(&step_id) {
                step.mark_in_progress();
            }
            attempted.insert(step_id.clone());

            match Self::run_step(flow, templates, &step_id, call_context, continue_on_error) {
                Ok(execution) => {
                    stats.record(flow_id, &step_id, true, execution.execution_time_ms);
                    if let Some(iterations) = &execution.iterations {
                        for iteration in iterations.iter().filter(|i| i.error.is_some()) {
                            failures.push(StepFailure { step_id: iteration.step_id.clone(),
                                                        error: iteration.error
                                                                        .clone()
                                                                        .unwrap_or_default() });
                        }
                    }
                    machine.transition(flow,
                                       FlowEvent::CompleteStep,
                                       json!({
                                           "step_id": step_id,
                                           "result": execution.template_content,
                                       }))?;
                    executions.push(execution);
                    advance_cursor(flow);
                    if flow.status.is_terminal() {
                        break;
                    }
                }
                Err(err) => {
                    stats.record(flow_id, &step_id, false, 0);
                    let message = err.to_string();
                    let critical = flow.steps
                                       .get(&step_id)
                                       .and_then(|s| s.config.get("critical"))
                                       .and_then(Value::as_bool)
                                       .unwrap_or(false);
                    machine.transition(flow,
                                       FlowEvent::FailStep,
                                       json!({
                                           "step_id": step_id,
                                           "error_message": message,
                                           "critical": critical,
                                       }))?;
                    failures.push(StepFailure { step_id: step_id.clone(),
                                                error: message.clone() });
                    if flow.status.is_terminal() {
                        break;
                    }
                    let exhausted = flow.steps
                                        .get(&step_id)
                                        .map(|s| !s.can_retry())
                                        .unwrap_or(true);
                    if exhausted {
                        if continue_on_error {
                            machine.transition(flow, FlowEvent::SkipStep, json!({ "step_id": step_id }))?;
                            advance_cursor(flow);
                        } else {
                            // agotado y no crítico: la corrida termina fallida
                            // pero el flow queda Running, en manos del caller
                            aborted = true;
                            break;
                        }
                    }
                }
            }
        }

        let steps_succeeded = flow.count_by_status(StepStatus::Completed);
        let steps_failed = flow.count_by_status(StepStatus::Failed);
        let status = if aborted || flow.status == FlowStatus::Failed || flow.status == FlowStatus::Cancelled {
            ExecutionStatus::Failed
        } else if failures.is_empty() {
            ExecutionStatus::Completed
        } else {
            ExecutionStatus::Partial
        };

        Ok(FlowRunSummary { flow_id,
                            status,
                            steps_executed: attempted.len(),
                            steps_succeeded,
                            steps_failed,
                            failures,
                            executions })
    }

    /// Resolución de un step contra el proveedor. Función asociada: recibe el
    /// flow y el proveedor por separado para poder convivir con préstamos
    /// disjuntos del executor.
    fn run_step(flow: &Flow,
                templates: &T,
                step_id: &str,
                call_context: &Map<String, Value>,
                continue_on_error: bool)
                -> Result<StepExecution, FlowCoreError> {
        let step = flow.steps
                       .get(step_id)
                       .ok_or_else(|| FlowCoreError::StepNotFound { flow_id: flow.flow_id,
                                                                    step_id: step_id.to_string() })?;
        let missing = flow.missing_dependencies(step);
        if !missing.is_empty() {
            return Err(FlowCoreError::DependenciesNotSatisfied { step_id: step_id.to_string(),
                                                                 missing });
        }

        let started = Instant::now();
        let merged = merge_context(&flow.context, call_context);

        if let Some(raw_ref) = step.for_each_ref() {
            return Self::run_for_each(flow, templates, step_id, raw_ref, merged, started, continue_on_error);
        }

        let template_name = resolve_template_name(templates, step, &merged);
        let params = template_params(step, &merged);
        let content = templates.get_template(&template_name, &params)?;

        Ok(StepExecution { execution_id: Uuid::new_v4(),
                           flow_id: flow.flow_id,
                           step_id: step_id.to_string(),
                           template_name,
                           template_content: content,
                           context: merged,
                           status: ExecutionStatus::Completed,
                           execution_time_ms: started.elapsed().as_millis() as u64,
                           iterations: None })
    }

    /// Expansión for-each: una sub-resolución por ítem de la colección fuente,
    /// con `current_item` e `iteration_index` inyectados al contexto. El
    /// agregado conserva el orden de iteración; una colección vacía completa
    /// con lista vacía (la degradación ya quedó logueada por la resolución).
    /// Sin `continue_on_error` la primera iteración fallida aborta el step.
    fn run_for_each(flow: &Flow,
                    templates: &T,
                    step_id: &str,
                    raw_ref: &str,
                    merged: Map<String, Value>,
                    started: Instant,
                    continue_on_error: bool)
                    -> Result<StepExecution, FlowCoreError> {
        let step = flow.steps
                       .get(step_id)
                       .ok_or_else(|| FlowCoreError::StepNotFound { flow_id: flow.flow_id,
                                                                    step_id: step_id.to_string() })?;
        let items = resolve_iteration_items(flow, step_id, raw_ref);
        let base_template = resolve_template_name(templates, step, &merged);

        let mut outcomes: Vec<IterationOutcome> = Vec::with_capacity(items.len());
        let mut aggregate: Vec<Value> = Vec::new();
        for (index, item) in items.into_iter().enumerate() {
            let sub_id = iteration_step_id(step_id, index);
            let mut iter_context = merged.clone();
            iter_context.insert("current_item".into(), item.clone());
            iter_context.insert("iteration_index".into(), json!(index));
            let template_name = resolve_template_name(templates, step, &iter_context);
            let params = template_params(step, &iter_context);
            match templates.get_template(&template_name, &params) {
                Ok(content) => {
                    // el agregado preserva JSON estructurado cuando lo hay
                    let value = serde_json::from_str(&content).unwrap_or(Value::String(content.clone()));
                    aggregate.push(value);
                    outcomes.push(IterationOutcome { iteration_index: index,
                                                     iteration_item: item,
                                                     step_id: sub_id,
                                                     result: Some(content),
                                                     error: None });
                }
                Err(err) => {
                    if !continue_on_error {
                        return Err(FlowCoreError::Internal(format!("for_each step {step_id} iteration {index}: {err}")));
                    }
                    outcomes.push(IterationOutcome { iteration_index: index,
                                                     iteration_item: item,
                                                     step_id: sub_id,
                                                     result: None,
                                                     error: Some(err.to_string()) });
                }
            }
        }

        let failed = outcomes.iter().filter(|o| o.error.is_some()).count();
        let status = if !outcomes.is_empty() && failed == outcomes.len() {
            ExecutionStatus::Failed
        } else if failed > 0 {
            ExecutionStatus::Partial
        } else {
            ExecutionStatus::Completed
        };
        if status == ExecutionStatus::Failed {
            // sin ninguna iteración exitosa el step agregado falla duro
            let first_error = outcomes.iter()
                                      .find_map(|o| o.error.clone())
                                      .unwrap_or_else(|| "all iterations failed".into());
            return Err(FlowCoreError::Internal(format!("for_each step {step_id}: {first_error}")));
        }

        Ok(StepExecution { execution_id: Uuid::new_v4(),
                           flow_id: flow.flow_id,
                           step_id: step_id.to_string(),
                           template_name: base_template,
                           template_content: Value::Array(aggregate).to_string(),
                           context: merged,
                           status,
                           execution_time_ms: started.elapsed().as_millis() as u64,
                           iterations: Some(outcomes) })
    }
}

/// Corre el puntero del pipeline por encima de los steps ya asentados.
fn advance_cursor(flow: &mut Flow) {
    loop {
        let settled = match flow.steps.get_index(flow.current_step_index) {
            Some((_, step)) => step.status.is_settled(),
            None => false,
        };
        if !settled {
            break;
        }
        flow.advance_step();
    }
}
